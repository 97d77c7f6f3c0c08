macro_rules! define {
    ($output:expr, $value:expr, $($name:tt)*) => {
        writeln!($output, "#define {} {}", format_args!($($name)*), $value)
    };
}

macro_rules! emit {
    ($output:expr, $($format:tt)*) => {{
        write!($output, "\t")?;
        writeln!($output, $($format)*)
    }};
}
