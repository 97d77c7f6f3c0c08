//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::Context;
use clap::{crate_version, Arg, Command};
use log::info;
use smcspec::{
    emit::{self, EmitOptions, Layout},
    error::Diagnostic,
    publish::{PublishOptions, Publisher},
    source::Source,
};

use std::{fs::File, io::BufReader, process::ExitCode};

/// Ruta por defecto del header de macros.
const DEFAULT_HEADER: &str = "./include/arg_struct_def.h";

/// Ruta por defecto de la fuente de tablas.
const DEFAULT_TABLES: &str = "./include/field_specification.h";

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parsing de CLI
    let args = Command::new("SMC fuzzer table generator")
        .version(crate_version!())
        .about("Generates SMC argument tables to add to the fuzzer library")
        .arg(
            Arg::new("smclist")
                .short('s')
                .long("smclist")
                .value_name("FILE")
                .takes_value(true)
                .required(true)
                .help("SMC list file"),
        )
        .arg(
            Arg::new("header")
                .long("header")
                .value_name("FILE")
                .takes_value(true)
                .default_value(DEFAULT_HEADER)
                .help("Output path for the macro header"),
        )
        .arg(
            Arg::new("tables")
                .long("tables")
                .value_name("FILE")
                .takes_value(true)
                .default_value(DEFAULT_TABLES)
                .help("Output path for the field tables"),
        )
        .arg(
            Arg::new("record-types")
                .long("record-types")
                .help("Declare the table record types before the tables"),
        )
        .arg(
            Arg::new("parents")
                .short('p')
                .long("parents")
                .help("Create missing output directories"),
        )
        .arg(
            Arg::new("check")
                .short('c')
                .long("check")
                .help("Validate the SMC list without writing any output"),
        )
        .get_matches();

    // Se extraen argumentos necesarios
    let path = args.value_of("smclist").context("Missing SMC list")?;
    let header = args.value_of("header").unwrap_or(DEFAULT_HEADER);
    let tables = args.value_of("tables").unwrap_or(DEFAULT_TABLES);

    let mut emit_options = EmitOptions::empty();
    if args.is_present("record-types") {
        emit_options |= EmitOptions::RECORD_TYPES;
    }

    let mut publish_options = PublishOptions::empty();
    if args.is_present("parents") {
        publish_options |= PublishOptions::CREATE_DIRS;
    }

    info!("starting generate SMC from {}", path);

    let file =
        File::open(path).with_context(|| format!("Failed to open for reading: {}", path))?;
    let source = Source::read(BufReader::new(file), path)
        .with_context(|| format!("Failed to read: {}", path))?;

    let registry = match smcspec::compile(&source) {
        Ok(registry) => registry,
        Err(error) => {
            eprint!("{}", Diagnostic::from(error));
            return Ok(ExitCode::FAILURE);
        }
    };

    if args.is_present("check") {
        info!("{} is valid, no output written", path);
        return Ok(ExitCode::SUCCESS);
    }

    let layout = Layout::assign(&registry);
    let mut publisher = Publisher::stage(header, tables, publish_options)
        .context("Failed to prepare output files")?;

    emit::emit_header(&layout, publisher.header())
        .with_context(|| format!("Failed to emit to file: {}", header))?;

    emit::emit_tables(&layout, emit_options, publisher.tables())
        .with_context(|| format!("Failed to emit to file: {}", tables))?;

    publisher.commit().context("Failed to publish output files")?;
    Ok(ExitCode::SUCCESS)
}
