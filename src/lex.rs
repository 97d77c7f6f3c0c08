//! Análisis léxico.
//!
//! # Clasificación de líneas
//! Esta es la primera fase del compilador. Cada línea de la lista de SMC,
//! ya recortada, corresponde a exactamente una producción de la gramática:
//!
//! ```text
//! smc: <nombre>
//! arg<N>: <nombre>
//! arg<N> = <valor>
//! arg<N>-arg<M> = <valor>
//! field:<nombre>:[<inicio>,<fin>] = <valor>
//! ```
//!
//! Las producciones se distinguen por su prefijo, por lo cual son
//! mutuamente excluyentes. El resultado es un [`Line`], una unión etiquetada
//! con una variante por producción. Cualquier otra cosa, incluyendo una
//! línea vacía, es un error fatal.
//!
//! # Reglas importantes del lenguaje
//! - Los nombres consisten en letras ASCII, dígitos y `'_'`.
//! - Números de registro y posiciones de bit son decimales.
//! - Los valores son decimales o hexadecimales con prefijo `0x`, y se
//!   resuelven a enteros sin signo de 64 bits.
//! - El lenguaje es case-sensitive.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Las líneas en blanco no forman parte de la gramática.
    #[error("Malformed line: blank lines are not allowed")]
    Blank,

    /// La línea no inicia con el prefijo de ninguna producción.
    #[error("Malformed line: expected any of `smc:`, `arg<N>:`, `arg<N>=`, `arg<N>-arg<M>=` or `field:`")]
    Unrecognized,

    /// Se reconoció el prefijo de una producción, pero no su forma completa.
    #[error("Malformed line: expected {0}")]
    Expected(&'static str),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Malformed line: integer literal overflow, valid range is [0, {0}]")]
    IntOverflow(u64),
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl Identifier {
    /// Construye un identificador sin verificar su contenido.
    ///
    /// Se utiliza para nombres sintetizados por el compilador.
    pub fn synthesize<S: AsRef<str>>(name: S) -> Self {
        Identifier(Rc::from(name.as_ref()))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Base en la que se escribió un literal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Radix {
    Decimal,
    Hexadecimal,
}

/// Literal entero sin signo.
///
/// Se preserva la base original para que el código C emitido se
/// lea igual que la lista de SMC.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Literal {
    pub value: u64,
    pub radix: Radix,
}

impl Display for Literal {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.radix {
            Radix::Decimal => write!(fmt, "{}", self.value),
            Radix::Hexadecimal => write!(fmt, "{:#x}", self.value),
        }
    }
}

/// Resultado de clasificar una línea.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// `smc: <name>`
    SmcDecl(Identifier),

    /// `arg<register>: <name>`
    ArgDecl { register: u32, name: Identifier },

    /// `arg<register> = <value>`
    ArgLiteral { register: u32, value: Literal },

    /// `arg<first>-arg<last> = <value>`
    ArgRangeLiteral {
        first: u32,
        last: u32,
        value: Literal,
    },

    /// `field:<name>:[<start>,<end>] = <value>`
    FieldDecl {
        name: Identifier,
        start: u32,
        end: u32,
        value: Literal,
    },
}

impl Line {
    /// Determina si la línea declara un argumento, de cualquier forma.
    pub fn is_arg(&self) -> bool {
        matches!(
            self,
            Line::ArgDecl { .. } | Line::ArgLiteral { .. } | Line::ArgRangeLiteral { .. }
        )
    }
}

impl Display for Line {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Line::*;

        match self {
            SmcDecl(name) => write!(fmt, "smc declaration `{}`", name),
            ArgDecl { register, name } => write!(fmt, "argument `arg{}: {}`", register, name),
            ArgLiteral { register, value } => {
                write!(fmt, "literal argument `arg{} = {}`", register, value)
            }

            ArgRangeLiteral { first, last, value } => write!(
                fmt,
                "literal argument range `arg{}-arg{} = {}`",
                first, last, value
            ),

            FieldDecl {
                name,
                start,
                end,
                value,
            } => write!(fmt, "field `{}:[{},{}] = {}`", name, start, end, value),
        }
    }
}

/// Clasifica una línea ya recortada.
pub fn classify(line: &str) -> Result<Line, LexerError> {
    if line.is_empty() {
        return Err(LexerError::Blank);
    }

    let mut cursor = Cursor(line);
    let parsed = if cursor.eat("smc:") {
        cursor.spaces();
        Line::SmcDecl(cursor.name()?)
    } else if cursor.eat("field:") {
        let name = cursor.name()?;
        cursor.expect(":[", "`:[` after field name")?;
        let start = cursor.decimal()?;
        cursor.expect(",", "`,` between bit positions")?;
        let end = cursor.decimal()?;
        cursor.expect("]", "`]` after bit positions")?;

        Line::FieldDecl {
            name,
            start,
            end,
            value: cursor.assignment()?,
        }
    } else if cursor.eat("arg") {
        let register = cursor.decimal()?;

        if cursor.eat("-arg") {
            let last = cursor.decimal()?;
            Line::ArgRangeLiteral {
                first: register,
                last,
                value: cursor.assignment()?,
            }
        } else {
            cursor.spaces();
            if cursor.eat(":") {
                cursor.spaces();
                Line::ArgDecl {
                    register,
                    name: cursor.name()?,
                }
            } else if cursor.peek() == Some('=') {
                Line::ArgLiteral {
                    register,
                    value: cursor.assignment()?,
                }
            } else {
                return Err(LexerError::Expected("`:`, `=` or `-arg` after register"));
            }
        }
    } else {
        return Err(LexerError::Unrecognized);
    };

    if cursor.0.is_empty() {
        Ok(parsed)
    } else {
        Err(LexerError::Expected("end of line"))
    }
}

/// Posición de lectura dentro de una línea.
struct Cursor<'a>(&'a str);

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.0.chars().next()
    }

    /// Consume un prefijo exacto, si está presente.
    fn eat(&mut self, prefix: &str) -> bool {
        match self.0.strip_prefix(prefix) {
            Some(rest) => {
                self.0 = rest;
                true
            }

            None => false,
        }
    }

    fn expect(&mut self, prefix: &str, what: &'static str) -> Result<(), LexerError> {
        if self.eat(prefix) {
            Ok(())
        } else {
            Err(LexerError::Expected(what))
        }
    }

    fn spaces(&mut self) {
        self.0 = self.0.trim_start();
    }

    /// Consume el mayor prefijo que cumple un predicado.
    fn take_while<P>(&mut self, predicate: P) -> &'a str
    where
        P: Fn(char) -> bool,
    {
        let end = self.0.find(|c| !predicate(c)).unwrap_or(self.0.len());
        let (taken, rest) = self.0.split_at(end);

        self.0 = rest;
        taken
    }

    fn name(&mut self) -> Result<Identifier, LexerError> {
        match self.take_while(is_name_char) {
            "" => Err(LexerError::Expected("a name made of letters, digits or `_`")),
            name => Ok(Identifier(Rc::from(name))),
        }
    }

    fn decimal(&mut self) -> Result<u32, LexerError> {
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(LexerError::Expected("a decimal number"));
        }

        accumulate(digits, 10)
            .and_then(|value| u32::try_from(value).ok())
            .ok_or(LexerError::IntOverflow(u32::MAX as u64))
    }

    /// `\s* = \s* <valor>`
    fn assignment(&mut self) -> Result<Literal, LexerError> {
        self.spaces();
        self.expect("=", "`=`")?;
        self.spaces();

        let (radix, digits) = if self.eat("0x") {
            (Radix::Hexadecimal, self.take_while(|c| c.is_ascii_hexdigit()))
        } else {
            (Radix::Decimal, self.take_while(|c| c.is_ascii_digit()))
        };

        if digits.is_empty() {
            return Err(LexerError::Expected("a decimal or `0x`-prefixed value"));
        }

        let base = match radix {
            Radix::Decimal => 10,
            Radix::Hexadecimal => 16,
        };

        let value = accumulate(digits, base).ok_or(LexerError::IntOverflow(u64::MAX))?;
        Ok(Literal { value, radix })
    }
}

/// Acumulación dígito por dígito, fallando en caso de desbordamiento.
fn accumulate(digits: &str, base: u32) -> Option<u64> {
    digits.chars().try_fold(0u64, |accumulated, digit| {
        let digit = digit.to_digit(base)? as u64;
        accumulated
            .checked_mul(base as u64)
            .and_then(|n| n.checked_add(digit))
    })
}

/// Determina si un carácter puede pertenecer a un nombre.
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
