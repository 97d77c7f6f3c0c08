//! Presentación de errores.
//!
//! La compilación se detiene en la primera violación, de modo que un
//! diagnóstico describe siempre un único error junto con la línea de
//! la lista de SMC que lo provocó.

use std::{
    error::Error,
    fmt::{self, Display},
};

use crate::source::{self, Located, Location};

/// Un error listo para presentarse al usuario, con contexto de código fuente.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    kind: &'static str,
    message: String,
    location: Location,
}

impl Diagnostic {
    /// Construye un diagnóstico a partir de un error ubicado.
    ///
    /// `kind` identifica la fase que rechazó la entrada, por ejemplo
    /// `"Lexical error"`.
    pub fn new<E: Error>(kind: &'static str, error: Located<E>) -> Self {
        let (location, error) = error.split();

        Diagnostic {
            kind,
            message: error.to_string(),
            location,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

impl Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostic {
            kind,
            message,
            location,
        } = self;

        writeln!(fmt, "{}: {}", kind, message)?;
        writeln!(fmt, " --> {}", location)?;

        let (start, end) = (location.start(), location.end());
        let gutter = end.line().to_string().len();
        writeln!(fmt, "{:gutter$} |", "", gutter = gutter)?;

        for number in start.line()..=end.line() {
            let line = location.source().line(number).unwrap_or("");
            writeln!(
                fmt,
                "{:>gutter$} | {}",
                number,
                source::expand_tabs(line),
                gutter = gutter
            )?;
        }

        // El final de la ubicación es exclusivo
        let (from, to) = (start.column(), end.column() - 1);
        let skip = (from.min(to) - 1) as usize;
        let highlight = (from.max(to) - from.min(to) + 1) as usize;

        writeln!(
            fmt,
            "{:gutter$} | {:skip$}{:^<highlight$}",
            "",
            "",
            "",
            gutter = gutter,
            skip = skip,
            highlight = highlight
        )
    }
}
