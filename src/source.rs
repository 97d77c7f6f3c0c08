//! Rastreo de ubicaciones originales en la lista de SMC.
//!
//! Cada declaración que el compilador acepta o rechaza debe poder
//! señalarse en el archivo de entrada original, lo cual permite que
//! los diagnósticos indiquen la línea y las columnas exactas que
//! provocaron un error.

use std::{
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    ops::Range,
    rc::Rc,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Obtiene el origen de esta ubicación.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end == start.advance() {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column - 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }

    /// Avanza sobre un carácter cualquiera.
    fn step(self, c: char) -> Position {
        match c {
            '\t' => self.tab(),
            _ => self.advance(),
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen y contenido completo, línea por línea.
///
/// La entrada se lee completa antes de iniciar cualquier análisis. No
/// existe compilación incremental: ninguna salida se produce sin antes
/// haber validado todas las líneas.
pub struct Source {
    name: String,
    lines: Vec<String>,
}

impl Source {
    /// Lee la totalidad de un flujo de entrada.
    pub fn read<R, S>(reader: R, name: S) -> io::Result<Rc<Source>>
    where
        R: BufRead,
        S: Into<String>,
    {
        let lines = reader.lines().collect::<io::Result<Vec<_>>>()?;
        Ok(Rc::new(Source {
            name: name.into(),
            lines,
        }))
    }

    /// Construye un origen a partir de texto ya disponible en memoria.
    pub fn from_text<S: Into<String>>(text: &str, name: S) -> Rc<Source> {
        Rc::new(Source {
            name: name.into(),
            lines: text.lines().map(String::from).collect(),
        })
    }

    /// Nombre del origen, usualmente una ruta.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtiene una línea por número (base 1), tal y como aparece en la entrada.
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = (number as usize).checked_sub(1)?;
        self.lines.get(index).map(String::as_str)
    }

    /// Itera sobre las líneas recortadas, cada una asociada a su ubicación.
    ///
    /// Las líneas en blanco no se omiten: forman parte de la gramática
    /// y el lexer las rechaza.
    pub fn lines(self: &Rc<Self>) -> impl Iterator<Item = Located<&str>> + '_ {
        self.lines.iter().enumerate().map(move |(index, line)| {
            let trimmed = line.trim();
            let skipped = line.len() - line.trim_start().len();

            let mut start = Position {
                line: index as u32 + 1,
                column: 1,
            };

            for c in line[..skipped].chars() {
                start = start.step(c);
            }

            let end = trimmed.chars().fold(start, Position::step);
            let end = if end == start { start.advance() } else { end };

            let location = Location {
                from: Rc::clone(self),
                position: start..end,
            };

            Located::at(trimmed, location)
        })
    }

    /// Ubicación inmediatamente posterior al último carácter de la entrada.
    pub fn eof(self: &Rc<Self>) -> Location {
        let line = self.lines.len().max(1) as u32;
        let start = self
            .line(line)
            .unwrap_or("")
            .chars()
            .fold(Position { line, column: 1 }, Position::step);

        Location {
            from: Rc::clone(self),
            position: start..start.advance(),
        }
    }
}

/// Expande tabuladores a espacios, respetando [`TAB_STOP`].
///
/// Los diagnósticos imprimen las líneas con esta expansión para que
/// las columnas calculadas coincidan con lo que se observa.
pub fn expand_tabs(line: &str) -> String {
    let mut expanded = String::with_capacity(line.len());
    let mut position = Position::default();

    for c in line.chars() {
        let next = position.step(c);
        match c {
            '\t' => expanded.extend((position.column..next.column).map(|_| ' ')),
            _ => expanded.push(c),
        }

        position = next;
    }

    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_trimmed_and_located() {
        let source = Source::from_text("smc: a\n  arg0: b  \n\n", "test.txt");
        let lines: Vec<_> = source.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(*lines[1].val(), "arg0: b");
        assert_eq!(lines[1].location().start().line(), 2);
        assert_eq!(lines[1].location().start().column(), 3);
        assert_eq!(lines[1].location().end().column(), 10);
        assert_eq!(lines[1].location().to_string(), "test.txt:[2:3-2:9]");

        // Una línea vacía señala una única columna
        assert_eq!(*lines[2].val(), "");
        assert_eq!(lines[2].location().to_string(), "test.txt:3:1");
    }

    #[test]
    fn tabs_advance_to_next_stop() {
        let source = Source::from_text("\tsmc: a", "tabs");
        let line = source.lines().next().unwrap();

        assert_eq!(line.location().start().column(), 5);
        assert_eq!(expand_tabs("\tx\ty"), "    x   y");
    }

    #[test]
    fn eof_points_past_last_line() {
        let source = Source::from_text("smc: a\narg0: x", "eof");
        assert_eq!(source.eof().to_string(), "eof:2:8");

        let empty = Source::from_text("", "empty");
        assert_eq!(empty.eof().to_string(), "empty:1:1");
    }
}
