use std::{fs, io, path::Path};

use smcspec::{
    compile,
    emit::{emit_header, emit_tables, EmitOptions, Layout},
    error::Diagnostic,
    publish::{PublishOptions, Publisher},
    source::Source,
    CompileError,
};
use tempfile::TempDir;

const LIST: &str = "\
smc: SMC_FFA_VERSION
arg0 = 0x84000063
arg1: version
field:minor:[0,15]=0
field:major:[16,30]=1
field:mbz:[31,31]=0
smc: SMC_PSCI_FEATURES
arg0 = 0x8400000a
arg1-arg3 = 0
";

/// Compila y publica, tal y como lo hace el driver.
fn generate(text: &str, header: &Path, tables: &Path) -> Result<(), CompileError> {
    let source = Source::from_text(text, "smclist");
    let registry = compile(&source)?;
    let layout = Layout::assign(&registry);

    let mut publisher = Publisher::stage(header, tables, PublishOptions::CREATE_DIRS).unwrap();
    emit_header(&layout, publisher.header()).unwrap();
    emit_tables(&layout, EmitOptions::empty(), publisher.tables()).unwrap();
    publisher.commit().unwrap();

    Ok(())
}

fn outputs(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let include = dir.path().join("include");
    (
        include.join("arg_struct_def.h"),
        include.join("field_specification.h"),
    )
}

#[test]
fn generates_both_outputs() -> io::Result<()> {
    let dir = TempDir::new()?;
    let (header, tables) = outputs(&dir);

    generate(LIST, &header, &tables).unwrap();

    let header = fs::read_to_string(&header)?;
    assert!(header.contains("#define SMC_FFA_VERSION 0\n"));
    assert!(header.contains("#define SMC_PSCI_FEATURES 1\n"));
    assert!(header.contains("#define MAX_SMC_CALLS 1\n"));
    assert!(header.contains("#define SMC_FFA_VERSION_ARG1 1\n"));
    assert!(header.contains("#define SMC_PSCI_FEATURES_ARG3 5\n"));
    assert!(header.contains("#define MAX_ARG_LENGTH 5\n"));
    assert!(header.contains("#define SMC_FFA_VERSION_ARG1_MAJOR_CNT 1\n"));
    assert!(header.contains("#define SMC_FFA_VERSION_ARG1_MBZ 3\n"));

    let tables = fs::read_to_string(&tables)?;
    assert!(tables.contains(".bnames = \"major\", .defval = 1, .regnum = 1,"));
    assert!(tables.contains(".bitw = 64, .bitst = 0, .bnames = \"SMC_FFA_VERSION_arg_0_field\", .defval = 0x84000063,"));
    assert!(tables.contains("int fuzzer_arg_array_range[] = {\n\t4,4,\n};"));
    assert!(tables.contains("int fuzzer_arg_array_start[] = {\n\t0,4,\n};"));
    assert!(tables.contains("\t{ .arg_span = {1,3} },\n"));
    assert!(tables.contains("\t{ .arg_span = {7,7} },\n"));

    Ok(())
}

#[test]
fn output_is_deterministic() -> io::Result<()> {
    let (first, second) = (TempDir::new()?, TempDir::new()?);
    let (first_header, first_tables) = outputs(&first);
    let (second_header, second_tables) = outputs(&second);

    generate(LIST, &first_header, &first_tables).unwrap();
    generate(LIST, &second_header, &second_tables).unwrap();

    assert_eq!(fs::read(&first_header)?, fs::read(&second_header)?);
    assert_eq!(fs::read(&first_tables)?, fs::read(&second_tables)?);
    Ok(())
}

#[test]
fn failed_compilation_keeps_previous_outputs() -> io::Result<()> {
    let dir = TempDir::new()?;
    let (header, tables) = outputs(&dir);

    generate(LIST, &header, &tables).unwrap();
    let before = (fs::read(&header)?, fs::read(&tables)?);

    let broken = format!("{}field:late:[0,1]=0\n", LIST);
    let error = generate(&broken, &header, &tables).unwrap_err();

    let rendered = Diagnostic::from(error).to_string();
    assert!(rendered.starts_with("Sequence error: Out of sequence"));
    assert!(rendered.contains(" --> smclist:[10:1-10:18]"));

    assert_eq!((fs::read(&header)?, fs::read(&tables)?), before);
    assert_eq!(fs::read_dir(dir.path().join("include"))?.count(), 2);
    Ok(())
}

#[test]
fn overlapping_fields_are_rejected() {
    let error = compile(&Source::from_text(
        "smc: call\narg0: x\nfield:a:[0,7]=0\nfield:b:[4,11]=0\n",
        "smclist",
    ))
    .unwrap_err();

    let rendered = Diagnostic::from(error).to_string();
    assert!(rendered.starts_with("Semantic error: Field overlap in `call` argument `x`"));
    assert!(rendered.contains("4 | field:b:[4,11]=0\n"));
}

#[test]
fn case_only_field_names_keep_outputs() -> io::Result<()> {
    let dir = TempDir::new()?;
    let (header, tables) = outputs(&dir);

    let clash = "smc: call\narg0: x\nfield:mode:[0,0]=0\nfield:MODE:[1,1]=0\n";
    let error = generate(clash, &header, &tables).unwrap_err();

    let rendered = Diagnostic::from(error).to_string();
    assert!(rendered.starts_with("Semantic error: Generated macro `call_ARG0_MODE_CNT` clashes"));
    assert!(rendered.contains("4 | field:MODE:[1,1]=0\n"));

    assert!(!header.exists());
    assert!(!tables.exists());
    Ok(())
}

#[test]
fn call_named_after_arg_macro() {
    let error = compile(&Source::from_text(
        "smc: a\narg1: x\nsmc: a_ARG1\narg0 = 0\n",
        "smclist",
    ))
    .unwrap_err();

    let rendered = Diagnostic::from(error).to_string();
    assert!(rendered.starts_with("Semantic error: Generated macro `a_ARG1` clashes"));
    assert!(rendered.contains(" --> smclist:[3:1-3:11]\n"));
}

#[test]
fn distinct_macros_are_defined_once() -> io::Result<()> {
    let dir = TempDir::new()?;
    let (header, tables) = outputs(&dir);

    generate(LIST, &header, &tables).unwrap();

    let header = fs::read_to_string(&header)?;
    let mut defined = std::collections::HashSet::new();
    for line in header.lines().filter(|line| line.starts_with("#define ")) {
        let name = line.split_whitespace().nth(1).unwrap();
        assert!(defined.insert(name.to_owned()), "{} defined twice", name);
    }

    Ok(())
}

#[test]
fn huge_register_ranges_are_rejected() {
    let error = compile(&Source::from_text(
        "smc: call\narg0-arg4294967294 = 0\n",
        "smclist",
    ))
    .unwrap_err();

    let rendered = Diagnostic::from(error).to_string();
    assert!(rendered.starts_with("Semantic error: Bad register range arg0-arg4294967294"));
}
