//! Compilador de especificaciones de argumentos SMC.
//!
//! # Front end
//! Cada lista de SMC deriva de un único archivo de texto, el cual se
//! lee completo en [`source`]. Cada línea se clasifica en [`lex`] como
//! una de cinco producciones, se somete al orden de declaración en
//! [`sequence`] y finalmente modifica el registro en [`registry`], donde
//! se valida unicidad de registros y nombres así como traslapes de bits.
//! El primer error detiene la compilación completa.
//!
//! # Back end
//! Con el registro terminado, [`emit`] asigna identificadores densos y
//! genera un header de macros y una fuente de tablas C que consume el
//! harness de fuzzing. Ambas salidas se preparan en archivos temporales
//! y se publican juntas en [`publish`], solo si todo tuvo éxito.

use std::rc::Rc;

use log::info;

#[macro_use]
mod macros;

pub mod emit;
pub mod error;
pub mod lex;
pub mod publish;
pub mod registry;
pub mod sequence;
pub mod source;

use crate::{
    error::Diagnostic,
    lex::{LexerError, Line},
    registry::{Builder, Registry, RegistryError},
    sequence::{SequenceError, Sequencer},
    source::{Located, Source},
};

/// Primer error encontrado durante la compilación, según la fase.
#[derive(Debug)]
pub enum CompileError {
    Lexer(Located<LexerError>),
    Sequence(Located<SequenceError>),
    Registry(Located<RegistryError>),
}

impl From<CompileError> for Diagnostic {
    fn from(error: CompileError) -> Self {
        match error {
            CompileError::Lexer(error) => Diagnostic::new("Lexical error", error),
            CompileError::Sequence(error) => Diagnostic::new("Sequence error", error),
            CompileError::Registry(error) => Diagnostic::new("Semantic error", error),
        }
    }
}

/// Construye el registro a partir de una lista de SMC completa.
///
/// Las líneas se procesan una a la vez: clasificación, verificación de
/// orden y mutación del registro. No hay recuperación ni acumulación de
/// errores, ya que el harness confía ciegamente en las tablas emitidas.
pub fn compile(source: &Rc<Source>) -> Result<Registry, CompileError> {
    let mut sequencer = Sequencer::default();
    let mut builder = Builder::default();

    for line in source.lines() {
        let (location, text) = line.split();
        let line = lex::classify(text)
            .map_err(|error| CompileError::Lexer(Located::at(error, location.clone())))?;

        sequencer
            .feed(&line)
            .map_err(|error| CompileError::Sequence(Located::at(error, location.clone())))?;

        let declared = match line {
            Line::SmcDecl(name) => builder.declare_smc(name),
            Line::ArgDecl { register, name } => builder.declare_arg(register, name),
            Line::ArgLiteral { register, value } => {
                builder.declare_arg_range(register, register, value)
            }

            Line::ArgRangeLiteral { first, last, value } => {
                builder.declare_arg_range(first, last, value)
            }

            Line::FieldDecl {
                name,
                start,
                end,
                value,
            } => builder.declare_field(name, start, end, value),
        };

        declared.map_err(|error| CompileError::Registry(Located::at(error, location.clone())))?;
    }

    sequencer
        .finish()
        .map_err(|error| CompileError::Sequence(Located::at(error, source.eof())))?;

    let registry = builder.finish();
    info!(
        "{}: {} SMC calls, {} arguments, {} fields",
        source.name(),
        registry.calls().len(),
        registry.total_args(),
        registry.total_fields()
    );

    Ok(registry)
}
