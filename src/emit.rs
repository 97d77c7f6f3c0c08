//! Emisión de tablas C.
//!
//! La emisión ocurre en dos pasadas de solo lectura sobre un
//! [`Registry`] terminado, siempre en orden de primera declaración
//! (llamada, luego argumento dentro de la llamada, luego campo dentro
//! del argumento):
//!
//! 1. [`Layout::assign()`] asigna identificadores densos desde cero a
//!    llamadas (`SmcId`), argumentos (`GlobalArgId`) y campos
//!    (`GlobalFieldId`), junto con los rangos y conteos derivados.
//! 2. [`emit_header()`] y [`emit_tables()`] escriben el header de macros
//!    y la fuente de tablas a partir de ese único layout.
//!
//! Todos los arreglos paralelos derivan del mismo recorrido, por lo
//! cual sus longitudes y rangos coinciden por construcción.

use std::io::{self, Write};

use bitflags::bitflags;

use crate::registry::{
    self, ArgSlot, FieldDef, Registry, SmcCall, HEADER_GUARD, MAX_ARG_LENGTH, MAX_SMC_CALLS,
};

/// Cantidad de valores por línea en los arreglos por llamada.
const VALUES_PER_LINE: usize = 20;

bitflags! {
    /// Opciones a aplicar durante la emisión.
    pub struct EmitOptions: u32 {
        /// Declarar `struct fuzzer_arg_def` y `struct fuzzer_arg_arange`
        /// al inicio de la fuente de tablas.
        ///
        /// El harness de fuzzing normalmente define estos tipos por su
        /// cuenta, en cuyo caso esta opción no debe utilizarse.
        const RECORD_TYPES = 0x01;
    }
}

/// Identificadores y rangos asignados en la primera pasada.
pub struct Layout<'a> {
    calls: Vec<CallEntry<'a>>,
    args: Vec<ArgEntry<'a>>,
    fields: Vec<FieldEntry<'a>>,
}

struct CallEntry<'a> {
    call: &'a SmcCall,
    id: usize,
    field_start: usize,
    field_count: usize,
}

struct ArgEntry<'a> {
    call: &'a SmcCall,
    arg: &'a ArgSlot,
    id: usize,
    first_field: usize,
}

struct FieldEntry<'a> {
    call: &'a SmcCall,
    arg: &'a ArgSlot,
    field: &'a FieldDef,
    id: usize,
    local: usize,
}

impl<'a> Layout<'a> {
    /// Primera pasada: asignación de identificadores.
    pub fn assign(registry: &'a Registry) -> Self {
        let mut layout = Layout {
            calls: Vec::with_capacity(registry.calls().len()),
            args: Vec::with_capacity(registry.total_args()),
            fields: Vec::with_capacity(registry.total_fields()),
        };

        for call in registry.calls() {
            let field_start = layout.fields.len();

            for arg in registry.args(call) {
                layout.args.push(ArgEntry {
                    call,
                    arg,
                    id: layout.args.len(),
                    first_field: layout.fields.len(),
                });

                for (local, field) in registry.fields(arg).iter().enumerate() {
                    layout.fields.push(FieldEntry {
                        call,
                        arg,
                        field,
                        id: layout.fields.len(),
                        local,
                    });
                }
            }

            layout.calls.push(CallEntry {
                call,
                id: layout.calls.len(),
                field_start,
                field_count: layout.fields.len() - field_start,
            });
        }

        layout
    }

    /// `SmcId` de cada llamada, por nombre.
    pub fn smc_ids(&self) -> impl Iterator<Item = (&'a str, usize)> + '_ {
        self.calls
            .iter()
            .map(|entry| (entry.call.name().as_ref(), entry.id))
    }

    /// Rango inclusivo `[primero, último]` de `GlobalFieldId` por argumento.
    ///
    /// Un argumento explícito sin campos produce un rango vacío, en cuyo
    /// caso el último es uno menos que el primero.
    pub fn spans(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.args.iter().map(|entry| {
            let first = entry.first_field as i64;
            (first, first + entry.arg.field_count() as i64 - 1)
        })
    }

    /// Cantidad de campos por llamada, en orden de `SmcId`.
    pub fn field_counts(&self) -> impl Iterator<Item = usize> + '_ {
        self.calls.iter().map(|entry| entry.field_count)
    }

    /// Índice del primer campo de cada llamada, en orden de `SmcId`.
    pub fn field_starts(&self) -> impl Iterator<Item = usize> + '_ {
        self.calls.iter().map(|entry| entry.field_start)
    }

    /// Cantidad total de llamadas.
    pub fn total_calls(&self) -> usize {
        self.calls.len()
    }

    /// Cantidad total de argumentos.
    pub fn total_args(&self) -> usize {
        self.args.len()
    }

    /// Longitud del arreglo plano de campos.
    pub fn total_fields(&self) -> usize {
        self.fields.len()
    }
}

fn arg_macro(call: &SmcCall, arg: &ArgSlot) -> String {
    registry::arg_macro(call.name().as_ref(), arg.register())
}

fn field_macro(call: &SmcCall, arg: &ArgSlot, field: &FieldDef) -> String {
    registry::field_macro(call.name().as_ref(), arg.register(), field.name().as_ref())
}

/// Segunda pasada, parte uno: header de macros.
pub fn emit_header<W: Write>(layout: &Layout<'_>, output: &mut W) -> io::Result<()> {
    writeln!(output, "/*")?;
    writeln!(output, " * Generated by smcspec, do not edit.")?;
    writeln!(output, " */")?;
    writeln!(output)?;
    writeln!(output, "#ifndef {}", HEADER_GUARD)?;
    writeln!(output, "#define {}", HEADER_GUARD)?;
    writeln!(output)?;

    for entry in &layout.calls {
        define!(output, entry.id, "{}", entry.call.name())?;
    }

    // Se cumple que hay al menos una llamada y un argumento por llamada
    let max_smc = layout.calls.len().saturating_sub(1);
    define!(output, max_smc, "{}", MAX_SMC_CALLS)?;
    writeln!(output)?;

    for entry in &layout.args {
        define!(output, entry.id, "{}", arg_macro(entry.call, entry.arg))?;
    }

    let max_arg = layout.args.len().saturating_sub(1);
    define!(output, max_arg, "{}", MAX_ARG_LENGTH)?;
    writeln!(output)?;

    for entry in &layout.fields {
        let name = field_macro(entry.call, entry.arg, entry.field);
        define!(output, entry.local, "{}", registry::count_macro(&name))?;
    }

    writeln!(output)?;
    writeln!(output)?;

    for entry in &layout.fields {
        let name = field_macro(entry.call, entry.arg, entry.field);
        define!(output, entry.id, "{}", name)?;
    }

    writeln!(output)?;
    writeln!(output, "#endif /* {} */", HEADER_GUARD)
}

/// Segunda pasada, parte dos: fuente de tablas.
pub fn emit_tables<W: Write>(
    layout: &Layout<'_>,
    options: EmitOptions,
    output: &mut W,
) -> io::Result<()> {
    writeln!(output, "/*")?;
    writeln!(output, " * Generated by smcspec, do not edit.")?;
    writeln!(output, " */")?;
    writeln!(output)?;

    if options.contains(EmitOptions::RECORD_TYPES) {
        record_types(output)?;
    }

    writeln!(output, "struct fuzzer_arg_def fuzzer_arg_array[] = {{")?;
    for entry in &layout.fields {
        let field = entry.field;
        emit!(
            output,
            "{{ .bitw = {}, .bitst = {}, .bnames = \"{}\", .defval = {}, .regnum = {}, .smcname = \"{}\", .smcargname = \"{}\" }},",
            field.width(),
            field.start(),
            field.name(),
            field.default_value(),
            entry.arg.register(),
            entry.call.name(),
            entry.arg.name()
        )?;
    }

    writeln!(output, "}};")?;
    writeln!(output)?;

    writeln!(output, "struct fuzzer_arg_arange fuzzer_arg_array_lst[] = {{")?;
    for (first, last) in layout.spans() {
        emit!(output, "{{ .arg_span = {{{},{}}} }},", first, last)?;
    }

    writeln!(output, "}};")?;
    writeln!(output)?;

    int_array(output, "fuzzer_arg_array_range", layout.field_counts())?;
    int_array(output, "fuzzer_arg_array_start", layout.field_starts())?;

    writeln!(output, "int fuzzer_fieldarg[] = {{")?;
    for entry in &layout.fields {
        emit!(output, "{},", arg_macro(entry.call, entry.arg))?;
    }

    writeln!(output, "}};")?;
    writeln!(output)?;

    writeln!(output, "int fuzzer_fieldcall[] = {{")?;
    for entry in &layout.fields {
        emit!(output, "{},", entry.call.name())?;
    }

    writeln!(output, "}};")?;
    writeln!(output)?;

    writeln!(output, "int fuzzer_fieldfld[] = {{")?;
    for entry in &layout.fields {
        let name = field_macro(entry.call, entry.arg, entry.field);
        emit!(output, "{},", registry::count_macro(&name))?;
    }

    writeln!(output, "}};")
}

/// Arreglo de enteros, con a lo sumo [`VALUES_PER_LINE`] valores por línea.
fn int_array<W, I>(output: &mut W, name: &str, values: I) -> io::Result<()>
where
    W: Write,
    I: Iterator<Item = usize>,
{
    writeln!(output, "int {}[] = {{", name)?;

    let values: Vec<_> = values.map(|value| value.to_string()).collect();
    for line in values.chunks(VALUES_PER_LINE) {
        emit!(output, "{},", line.join(","))?;
    }

    writeln!(output, "}};")?;
    writeln!(output)
}

fn record_types<W: Write>(output: &mut W) -> io::Result<()> {
    writeln!(output, "#include <stdint.h>")?;
    writeln!(output)?;

    writeln!(output, "struct fuzzer_arg_def {{")?;
    emit!(output, "int bitw;")?;
    emit!(output, "int bitst;")?;
    emit!(output, "char *bnames;")?;
    emit!(output, "uint64_t defval;")?;
    emit!(output, "int regnum;")?;
    emit!(output, "char *smcname;")?;
    emit!(output, "char *smcargname;")?;
    writeln!(output, "}};")?;
    writeln!(output)?;

    writeln!(output, "struct fuzzer_arg_arange {{")?;
    emit!(output, "int arg_span[2];")?;
    writeln!(output, "}};")?;
    writeln!(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, source::Source};

    fn registry(text: &str) -> Registry {
        compile(&Source::from_text(text, "test")).unwrap()
    }

    fn render(registry: &Registry, options: EmitOptions) -> (String, String) {
        let layout = Layout::assign(registry);
        let (mut header, mut tables) = (Vec::new(), Vec::new());

        emit_header(&layout, &mut header).unwrap();
        emit_tables(&layout, options, &mut tables).unwrap();

        (
            String::from_utf8(header).unwrap(),
            String::from_utf8(tables).unwrap(),
        )
    }

    const DEMO: &str = "smc: demo_call\n\
                        arg0: control\n\
                        field:enable:[0,0]=1\n\
                        field:mode:[1,2]=0\n";

    const MIXED: &str = "smc: first\n\
                         arg1: flags\n\
                         field:a:[0,7]=0xff\n\
                         field:b:[8,15]=2\n\
                         arg2-arg3 = 0x10\n\
                         arg4: empty\n\
                         smc: second\n\
                         arg0 = 7\n\
                         arg1: ctl\n\
                         field:lo:[0,31]=0\n\
                         field:hi:[32,63]=0x1\n";

    #[test]
    fn demo_layout() {
        let registry = registry(
            "smc: demo_call\narg0: control\nfield:enable:[0,0]=1\nfield:mode:[1,2]=0",
        );
        let layout = Layout::assign(&registry);

        assert_eq!(layout.smc_ids().collect::<Vec<_>>(), vec![("demo_call", 0)]);
        assert_eq!(layout.total_args(), 1);
        assert_eq!(layout.total_fields(), 2);
        assert_eq!(layout.spans().collect::<Vec<_>>(), vec![(0, 1)]);
        assert_eq!(layout.field_counts().collect::<Vec<_>>(), vec![2]);
        assert_eq!(layout.field_starts().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn parallel_arrays_agree() {
        let registry = registry(MIXED);
        let layout = Layout::assign(&registry);

        assert_eq!(layout.total_calls(), 2);
        assert_eq!(layout.field_counts().sum::<usize>(), layout.total_fields());

        let mut expected_first = 0;
        let all_args = registry
            .calls()
            .iter()
            .flat_map(|call| registry.args(call).iter());

        for ((first, last), arg) in layout.spans().zip(all_args) {
            assert_eq!(first, expected_first);
            assert_eq!(last - first + 1, arg.field_count() as i64);
            expected_first = last + 1;
        }

        assert_eq!(expected_first, layout.total_fields() as i64);
        assert_eq!(layout.spans().collect::<Vec<_>>()[3], (4, 3));
        assert_eq!(layout.field_starts().collect::<Vec<_>>(), vec![0, 4]);
    }

    #[test]
    fn demo_header() {
        let (header, _) = render(&registry(DEMO), EmitOptions::empty());

        let expected = "/*\n * Generated by smcspec, do not edit.\n */\n\n\
                        #ifndef ARG_STRUCT_DEF_H\n\
                        #define ARG_STRUCT_DEF_H\n\n\
                        #define demo_call 0\n\
                        #define MAX_SMC_CALLS 0\n\n\
                        #define demo_call_ARG0 0\n\
                        #define MAX_ARG_LENGTH 0\n\n\
                        #define demo_call_ARG0_ENABLE_CNT 0\n\
                        #define demo_call_ARG0_MODE_CNT 1\n\n\n\
                        #define demo_call_ARG0_ENABLE 0\n\
                        #define demo_call_ARG0_MODE 1\n\n\
                        #endif /* ARG_STRUCT_DEF_H */\n";

        assert_eq!(header, expected);
    }

    #[test]
    fn demo_tables() {
        let (_, tables) = render(&registry(DEMO), EmitOptions::empty());

        assert!(tables.contains(
            "\t{ .bitw = 1, .bitst = 0, .bnames = \"enable\", .defval = 1, .regnum = 0, \
             .smcname = \"demo_call\", .smcargname = \"control\" },\n"
        ));

        assert!(tables.contains(
            "\t{ .bitw = 2, .bitst = 1, .bnames = \"mode\", .defval = 0, .regnum = 0, \
             .smcname = \"demo_call\", .smcargname = \"control\" },\n"
        ));

        assert!(tables.contains("\t{ .arg_span = {0,1} },\n"));
        assert!(tables.contains("int fuzzer_arg_array_range[] = {\n\t2,\n};\n"));
        assert!(tables.contains("int fuzzer_arg_array_start[] = {\n\t0,\n};\n"));
        assert!(tables.contains(
            "int fuzzer_fieldarg[] = {\n\tdemo_call_ARG0,\n\tdemo_call_ARG0,\n};"
        ));
        assert!(tables.contains("int fuzzer_fieldcall[] = {\n\tdemo_call,\n\tdemo_call,\n};"));
        assert!(tables.contains(
            "int fuzzer_fieldfld[] = {\n\tdemo_call_ARG0_ENABLE_CNT,\n\tdemo_call_ARG0_MODE_CNT,\n};"
        ));

        assert!(!tables.contains("struct fuzzer_arg_def {"));
    }

    #[test]
    fn literal_args_in_tables() {
        let (header, tables) = render(&registry(MIXED), EmitOptions::empty());

        assert!(header.contains("#define first_ARG2 1\n"));
        assert!(header.contains("#define first_ARG3_FIRST_ARG_3_FIELD_CNT 0\n"));
        assert!(header.contains("#define second_ARG0_SECOND_ARG_0_FIELD 4\n"));
        assert!(header.contains("#define MAX_SMC_CALLS 1\n"));
        assert!(header.contains("#define MAX_ARG_LENGTH 5\n"));

        assert!(tables.contains(
            "\t{ .bitw = 64, .bitst = 0, .bnames = \"first_arg_2_field\", .defval = 0x10, \
             .regnum = 2, .smcname = \"first\", .smcargname = \"first_arg_2\" },\n"
        ));

        assert!(tables.contains(".bnames = \"a\", .defval = 0xff,"));
    }

    #[test]
    fn record_types_prelude() {
        let (_, tables) = render(&registry(DEMO), EmitOptions::RECORD_TYPES);

        let prelude = tables.find("struct fuzzer_arg_def {").unwrap();
        let array = tables.find("struct fuzzer_arg_def fuzzer_arg_array[]").unwrap();

        assert!(prelude < array);
        assert!(tables.contains("\tuint64_t defval;\n"));
        assert!(tables.contains("\tint arg_span[2];\n"));
    }

    #[test]
    fn wide_int_arrays_wrap() {
        let mut text = String::new();
        for call in 0..25 {
            text.push_str(&format!("smc: call{}\narg0 = 0\n", call));
        }

        let (_, tables) = render(&registry(&text), EmitOptions::empty());
        let ones = vec!["1"; 20].join(",");

        assert!(tables.contains(&format!(
            "int fuzzer_arg_array_range[] = {{\n\t{},\n\t1,1,1,1,1,\n}};",
            ones
        )));
    }

    #[test]
    fn deterministic() {
        let first = render(&registry(MIXED), EmitOptions::RECORD_TYPES);
        let second = render(&registry(MIXED), EmitOptions::RECORD_TYPES);

        assert_eq!(first, second);
    }
}
