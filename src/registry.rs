//! Registro de llamadas, argumentos y campos.
//!
//! El registro es una arena de tres niveles: llamadas SMC, argumentos
//! (uno por registro de procesador) y campos de bits. Los elementos
//! se almacenan en vectores planos en orden de primera declaración,
//! de modo que los argumentos de una misma llamada y los campos de un
//! mismo argumento ocupan siempre rangos contiguos.
//!
//! El registro se construye en una única pasada por medio de un
//! [`Builder`], el cual valida unicidad de nombres y registros así como
//! traslapes de rangos de bits. Las tablas de búsqueda por nombre solo
//! existen durante la construcción y se descartan en
//! [`Builder::finish()`]; el [`Registry`] resultante es inmutable.
//!
//! Los nombres se comparan distinguiendo mayúsculas, pero las macros
//! del header generado comparten un único espacio de nombres de C. El
//! constructor reserva cada macro que una declaración va a producir y
//! rechaza cualquier choque, ya sea entre campos que solo difieren en
//! mayúsculas o entre llamadas cuyos nombres coinciden con macros de
//! otras.

use std::{collections::HashSet, ops::Range};

use log::debug;
use thiserror::Error;

use crate::lex::{Identifier, Literal};

/// Bit más significativo de un argumento.
pub const MAX_BIT: u8 = 63;

/// Último registro de argumento que el harness transfiere (`x17`).
pub const MAX_REGISTER: u32 = 17;

/// Guarda de inclusión del header de macros.
pub const HEADER_GUARD: &str = "ARG_STRUCT_DEF_H";

/// Macro con el `SmcId` más alto.
pub const MAX_SMC_CALLS: &str = "MAX_SMC_CALLS";

/// Macro con el `GlobalArgId` más alto.
pub const MAX_ARG_LENGTH: &str = "MAX_ARG_LENGTH";

/// Nombre de la macro de un argumento: `SMC_ARGn`.
pub fn arg_macro(smc: &str, register: u32) -> String {
    format!("{}_ARG{}", smc, register)
}

/// Nombre de la macro de un campo: `SMC_ARGn_FIELD`.
pub fn field_macro(smc: &str, register: u32, field: &str) -> String {
    format!(
        "{}_{}",
        arg_macro(smc, register),
        field.to_ascii_uppercase()
    )
}

/// Macro del índice local de un campo: `SMC_ARGn_FIELD_CNT`.
pub fn count_macro(field_macro: &str) -> String {
    format!("{}_CNT", field_macro)
}

/// Error semántico al construir el registro.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("SMC call `{0}` is already defined")]
    DuplicateSmc(Identifier),

    #[error("Register already specified for SMC call `{smc}`: arg{register}")]
    DuplicateRegister { smc: Identifier, register: u32 },

    #[error("Argument name `{name}` is already used in SMC call `{smc}`")]
    DuplicateArgName { smc: Identifier, name: Identifier },

    #[error("Register arg{0} is out of range, expected arg0 to arg{max}", max = MAX_REGISTER)]
    BadRegister(u32),

    #[error(
        "Bad register range arg{first}-arg{last}, expected arg0 <= first <= last <= arg{max}",
        max = MAX_REGISTER
    )]
    BadRegisterRange { first: u32, last: u32 },

    #[error(
        "Bad bit range [{start},{end}] for field `{field}`, expected 0 <= start <= end <= {max}",
        max = MAX_BIT
    )]
    BadBitRange { field: Identifier, start: u32, end: u32 },

    #[error("Field overlap in `{smc}` argument `{arg}`: `{field}` [{start},{end}] intersects `{existing}` [{existing_start},{existing_end}]")]
    FieldOverlap {
        smc: Identifier,
        arg: Identifier,
        field: Identifier,
        start: u8,
        end: u8,
        existing: Identifier,
        existing_start: u8,
        existing_end: u8,
    },

    #[error("Field name `{field}` is already used in `{smc}` argument `{arg}`")]
    DuplicateFieldName {
        smc: Identifier,
        arg: Identifier,
        field: Identifier,
    },

    #[error("Generated macro `{0}` clashes with an earlier definition in the header")]
    MacroClash(String),

    #[error("Argument declared outside of an `smc:` block")]
    NoOpenSmc,

    #[error("Field declared without an explicit argument to hold it")]
    NoOpenArg,
}

/// Una llamada SMC.
#[derive(Debug)]
pub struct SmcCall {
    name: Identifier,
    args: Range<usize>,
}

impl SmcCall {
    /// Nombre de la llamada, único en toda la lista de SMC.
    pub fn name(&self) -> &Identifier {
        &self.name
    }
}

/// Origen de un argumento.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgKind {
    /// `arg<N>: <nombre>`, seguido de cero o más campos.
    Explicit,

    /// `arg<N> = <valor>` o parte de `arg<N>-arg<M> = <valor>`, con un
    /// único campo implícito de 64 bits.
    Literal,
}

/// Un argumento de tamaño de registro.
#[derive(Debug)]
pub struct ArgSlot {
    call: usize,
    register: u32,
    name: Identifier,
    kind: ArgKind,
    fields: Range<usize>,
}

impl ArgSlot {
    pub fn register(&self) -> u32 {
        self.register
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    /// Cantidad de campos declarados para este argumento.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Un campo de bits dentro de un argumento.
#[derive(Debug)]
pub struct FieldDef {
    arg: usize,
    name: Identifier,
    start: u8,
    end: u8,
    default: Literal,
}

impl FieldDef {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    /// Primer bit, inclusivo.
    pub fn start(&self) -> u8 {
        self.start
    }

    /// Último bit, inclusivo.
    pub fn end(&self) -> u8 {
        self.end
    }

    /// Ancho en bits.
    pub fn width(&self) -> u8 {
        self.end - self.start + 1
    }

    /// Valor por defecto que el fuzzer utiliza cuando no muta este campo.
    pub fn default_value(&self) -> Literal {
        self.default
    }
}

/// Registro inmutable y completamente validado.
#[derive(Debug, Default)]
pub struct Registry {
    calls: Vec<SmcCall>,
    args: Vec<ArgSlot>,
    fields: Vec<FieldDef>,
}

impl Registry {
    /// Llamadas en orden de declaración.
    pub fn calls(&self) -> &[SmcCall] {
        &self.calls
    }

    /// Argumentos de una llamada, en orden de declaración.
    pub fn args(&self, call: &SmcCall) -> &[ArgSlot] {
        &self.args[call.args.clone()]
    }

    /// Campos de un argumento, en orden de declaración.
    pub fn fields(&self, arg: &ArgSlot) -> &[FieldDef] {
        &self.fields[arg.fields.clone()]
    }

    /// Argumento dueño de un campo.
    pub fn arg_of(&self, field: &FieldDef) -> &ArgSlot {
        &self.args[field.arg]
    }

    pub fn total_args(&self) -> usize {
        self.args.len()
    }

    pub fn total_fields(&self) -> usize {
        self.fields.len()
    }
}

/// Constructor incremental del registro.
///
/// Cada operación valida contra el alcance que protege: registros y
/// nombres de argumento por llamada, rangos de bits y nombres de campo
/// por argumento. Las macros generadas se validan en toda la lista.
pub struct Builder {
    registry: Registry,
    names: HashSet<Identifier>,
    macros: HashSet<String>,
    scope: Option<CallScope>,
}

impl Default for Builder {
    fn default() -> Self {
        let fixed = [HEADER_GUARD, MAX_SMC_CALLS, MAX_ARG_LENGTH];

        Builder {
            registry: Registry::default(),
            names: HashSet::new(),
            macros: fixed.iter().map(|name| name.to_string()).collect(),
            scope: None,
        }
    }
}

/// Ocupación dentro de la llamada abierta.
struct CallScope {
    registers: HashSet<u32>,
    arg_names: HashSet<Identifier>,
    current: Option<ArgScope>,
}

/// Ocupación dentro del argumento explícito abierto.
#[derive(Default)]
struct ArgScope {
    occupied: Vec<(u8, u8)>,
    field_names: HashSet<Identifier>,
}

impl Builder {
    /// Abre una nueva llamada.
    pub fn declare_smc(&mut self, name: Identifier) -> Result<(), RegistryError> {
        if self.names.contains(&name) {
            return Err(RegistryError::DuplicateSmc(name));
        }

        self.reserve(vec![name.to_string()])?;
        self.names.insert(name.clone());

        let next_arg = self.registry.args.len();
        debug!("smc `{}` opened as call #{}", name, self.registry.calls.len());

        self.registry.calls.push(SmcCall {
            name,
            args: next_arg..next_arg,
        });

        self.scope = Some(CallScope {
            registers: HashSet::new(),
            arg_names: HashSet::new(),
            current: None,
        });

        Ok(())
    }

    /// Abre un argumento explícito, el cual puede recibir campos.
    pub fn declare_arg(&mut self, register: u32, name: Identifier) -> Result<(), RegistryError> {
        let smc = self.current_call()?;
        let scope = self.scope.as_ref().ok_or(RegistryError::NoOpenSmc)?;

        if register > MAX_REGISTER {
            return Err(RegistryError::BadRegister(register));
        } else if scope.registers.contains(&register) {
            return Err(RegistryError::DuplicateRegister { smc, register });
        } else if scope.arg_names.contains(&name) {
            return Err(RegistryError::DuplicateArgName { smc, name });
        }

        self.reserve(vec![arg_macro(smc.as_ref(), register)])?;

        debug!("{}: explicit arg{} `{}`", smc, register, name);
        self.push_arg(register, name, ArgKind::Explicit)?;

        if let Some(scope) = &mut self.scope {
            scope.current = Some(ArgScope::default());
        }

        Ok(())
    }

    /// Sintetiza argumentos literales para un rango inclusivo de registros.
    ///
    /// Cada registro recibe un argumento cerrado con un único campo
    /// implícito `[0,63]`. Todo el rango se valida antes de modificar
    /// el registro.
    pub fn declare_arg_literal(
        &mut self,
        registers: Range<u32>,
        value: Literal,
    ) -> Result<(), RegistryError> {
        let smc = self.current_call()?;
        let scope = self.scope.as_ref().ok_or(RegistryError::NoOpenSmc)?;

        let synthesized = |register| Identifier::synthesize(format!("{}_arg_{}", smc, register));
        let field_of = |arg: &Identifier| Identifier::synthesize(format!("{}_field", arg));

        let mut macros = Vec::new();
        for register in registers.clone() {
            if register > MAX_REGISTER {
                return Err(RegistryError::BadRegister(register));
            } else if scope.registers.contains(&register) {
                return Err(RegistryError::DuplicateRegister {
                    smc: smc.clone(),
                    register,
                });
            }

            let name = synthesized(register);
            if scope.arg_names.contains(&name) {
                return Err(RegistryError::DuplicateArgName {
                    smc: smc.clone(),
                    name,
                });
            }

            let field = field_macro(smc.as_ref(), register, field_of(&name).as_ref());
            macros.push(arg_macro(smc.as_ref(), register));
            macros.push(count_macro(&field));
            macros.push(field);
        }

        self.reserve(macros)?;

        for register in registers {
            let name = synthesized(register);
            debug!("{}: literal arg{} = {}", smc, register, value);

            let field = field_of(&name);
            let arg = self.push_arg(register, name, ArgKind::Literal)?;
            self.push_field(arg, field, 0, MAX_BIT, value);
        }

        // Los campos no pueden agregarse a argumentos literales
        if let Some(scope) = &mut self.scope {
            scope.current = None;
        }

        Ok(())
    }

    /// Variante de [`Builder::declare_arg_literal()`] para `arg<first>-arg<last>`.
    pub fn declare_arg_range(
        &mut self,
        first: u32,
        last: u32,
        value: Literal,
    ) -> Result<(), RegistryError> {
        // El tope también acota cuántos argumentos sintetiza una sola línea
        if first == last && last > MAX_REGISTER {
            return Err(RegistryError::BadRegister(last));
        } else if first > last || last > MAX_REGISTER {
            return Err(RegistryError::BadRegisterRange { first, last });
        }

        self.declare_arg_literal(first..last + 1, value)
    }

    /// Agrega un campo al argumento explícito abierto.
    pub fn declare_field(
        &mut self,
        name: Identifier,
        start: u32,
        end: u32,
        value: Literal,
    ) -> Result<(), RegistryError> {
        let (start, end) = match (u8::try_from(start), u8::try_from(end)) {
            (Ok(start), Ok(end)) if start <= end && end <= MAX_BIT => (start, end),
            _ => return Err(RegistryError::BadBitRange { field: name, start, end }),
        };

        let arg_index = self
            .registry
            .args
            .len()
            .checked_sub(1)
            .ok_or(RegistryError::NoOpenArg)?;

        let current = self
            .scope
            .as_ref()
            .and_then(|scope| scope.current.as_ref())
            .ok_or(RegistryError::NoOpenArg)?;

        let arg = &self.registry.args[arg_index];
        let smc = &self.registry.calls[arg.call].name;

        if current.field_names.contains(&name) {
            return Err(RegistryError::DuplicateFieldName {
                smc: smc.clone(),
                arg: arg.name.clone(),
                field: name,
            });
        }

        let overlapping = current
            .occupied
            .iter()
            .position(|&(existing_start, existing_end)| {
                start <= existing_end && existing_start <= end
            });

        if let Some(index) = overlapping {
            let (existing_start, existing_end) = current.occupied[index];
            let existing = &self.registry.fields[arg.fields.start + index];

            return Err(RegistryError::FieldOverlap {
                smc: smc.clone(),
                arg: arg.name.clone(),
                field: name,
                start,
                end,
                existing: existing.name.clone(),
                existing_start,
                existing_end,
            });
        }

        let field = field_macro(smc.as_ref(), arg.register, name.as_ref());
        debug!("{}.{}: field `{}` [{},{}] = {}", smc, arg.name, name, start, end, value);

        self.reserve(vec![count_macro(&field), field])?;
        if let Some(current) = self.scope.as_mut().and_then(|scope| scope.current.as_mut()) {
            current.occupied.push((start, end));
            current.field_names.insert(name.clone());
        }

        self.push_field(arg_index, name, start, end, value);
        Ok(())
    }

    /// Descarta las tablas de búsqueda y entrega el registro terminado.
    pub fn finish(self) -> Registry {
        let Builder { registry, .. } = self;
        debug!(
            "registry finished: {} calls, {} args, {} fields",
            registry.calls.len(),
            registry.args.len(),
            registry.fields.len()
        );

        registry
    }

    /// Reserva todas las macros de una declaración, o ninguna.
    fn reserve(&mut self, macros: Vec<String>) -> Result<(), RegistryError> {
        {
            let mut pending = HashSet::new();
            for name in &macros {
                if self.macros.contains(name) || !pending.insert(name) {
                    return Err(RegistryError::MacroClash(name.clone()));
                }
            }
        }

        self.macros.extend(macros);
        Ok(())
    }

    fn current_call(&self) -> Result<Identifier, RegistryError> {
        match (&self.scope, self.registry.calls.last()) {
            (Some(_), Some(call)) => Ok(call.name.clone()),
            _ => Err(RegistryError::NoOpenSmc),
        }
    }

    fn push_arg(
        &mut self,
        register: u32,
        name: Identifier,
        kind: ArgKind,
    ) -> Result<usize, RegistryError> {
        let scope = self.scope.as_mut().ok_or(RegistryError::NoOpenSmc)?;
        scope.registers.insert(register);
        scope.arg_names.insert(name.clone());

        let call = self.registry.calls.len() - 1;
        let index = self.registry.args.len();
        let next_field = self.registry.fields.len();

        self.registry.args.push(ArgSlot {
            call,
            register,
            name,
            kind,
            fields: next_field..next_field,
        });

        self.registry.calls[call].args.end = index + 1;
        Ok(index)
    }

    fn push_field(&mut self, arg: usize, name: Identifier, start: u8, end: u8, default: Literal) {
        self.registry.fields.push(FieldDef {
            arg,
            name,
            start,
            end,
            default,
        });

        self.registry.args[arg].fields.end = self.registry.fields.len();
    }
}
