//! Orden de declaración.
//!
//! Cada bloque de la lista de SMC consiste en exactamente una línea
//! `smc:`, seguida de al menos una declaración de argumento, cada una
//! de las cuales puede ir seguida de campos si se trata de un argumento
//! explícito (`arg<N>: <nombre>`). Este orden es implícito en la
//! gramática y se verifica aquí, antes de tocar el registro.

use thiserror::Error;

use crate::lex::Line;

/// Violación del orden de declaración.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("Out of sequence: `smc: {0}` follows an `smc:` declaration without arguments")]
    SmcWithoutArgs(String),

    #[error("Out of sequence: {0} must follow an `smc:` declaration")]
    ArgWithoutSmc(String),

    #[error("Out of sequence: {0} must follow an explicit `arg<N>: <name>` declaration")]
    FieldWithoutArg(String),

    #[error("Incomplete SMC list: {0}")]
    IncompleteTrailer(&'static str),
}

/// Posibles estados de la máquina.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Estado inicial, se espera `smc:`.
    SeekSmc,

    /// Se abrió una llamada, pero todavía no tiene argumentos.
    InArgs,

    /// Se declaró al menos un argumento. Este es el único estado final
    /// válido.
    ///
    /// Solo se aceptan campos si el último argumento fue explícito.
    /// Los argumentos literales sintetizan su propio campo implícito.
    InFieldsOrNextArg { explicit: bool },
}

/// Máquina de estados para el orden de declaración.
#[derive(Debug)]
pub struct Sequencer {
    state: State,
}

impl Default for Sequencer {
    fn default() -> Self {
        Sequencer {
            state: State::SeekSmc,
        }
    }
}

impl Sequencer {
    /// Estado actual.
    pub fn state(&self) -> State {
        self.state
    }

    /// Admite o rechaza una línea, avanzando de estado si es admitida.
    pub fn feed(&mut self, line: &Line) -> Result<(), SequenceError> {
        use State::*;

        let next = match (self.state, line) {
            (SeekSmc | InFieldsOrNextArg { .. }, Line::SmcDecl(_)) => InArgs,
            (InArgs, Line::SmcDecl(name)) => {
                return Err(SequenceError::SmcWithoutArgs(name.to_string()))
            }

            (InArgs | InFieldsOrNextArg { .. }, line) if line.is_arg() => InFieldsOrNextArg {
                explicit: matches!(line, Line::ArgDecl { .. }),
            },

            (SeekSmc, line) if line.is_arg() => {
                return Err(SequenceError::ArgWithoutSmc(line.to_string()))
            }

            (InFieldsOrNextArg { explicit: true }, Line::FieldDecl { .. }) => self.state,
            (_, line) => return Err(SequenceError::FieldWithoutArg(line.to_string())),
        };

        self.state = next;
        Ok(())
    }

    /// Verifica que la entrada haya terminado en un estado final.
    pub fn finish(self) -> Result<(), SequenceError> {
        match self.state {
            State::InFieldsOrNextArg { .. } => Ok(()),
            State::SeekSmc => Err(SequenceError::IncompleteTrailer(
                "no `smc:` declarations were found",
            )),

            State::InArgs => Err(SequenceError::IncompleteTrailer(
                "last `smc:` declaration has no arguments",
            )),
        }
    }
}
