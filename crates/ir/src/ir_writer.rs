use std::io;

use cranelift_entity::{EntityRef, SecondaryMap};

use crate::{
    body::{ExceptionHandler, HandlerKind},
    inst::{InstData, InstId, Operand},
    module::{FuncRef, MemberStore, TypeDef},
    Body, Function, Module,
};

pub struct ModuleWriter<'a> {
    module: &'a Module,
}

impl<'a> ModuleWriter<'a> {
    pub fn new(module: &'a Module) -> Self {
        Self { module }
    }

    pub fn write(&mut self, mut w: impl io::Write) -> io::Result<()> {
        writeln!(w, "module {}", self.module.name)?;
        for reference in &self.module.references {
            writeln!(w, "reference {reference}")?;
        }
        for annotation in self.module.annotations.iter() {
            writeln!(w, ".custom {annotation}")?;
        }

        for def in self.module.types.values() {
            writeln!(w)?;
            self.write_type(def, &mut w)?;
        }

        Ok(())
    }

    fn write_type(&self, def: &TypeDef, mut w: impl io::Write) -> io::Result<()> {
        for annotation in def.annotations.iter() {
            writeln!(w, "{annotation}")?;
        }
        let value = if def.is_value_type { "value " } else { "" };
        writeln!(w, "type {value}{} {{", def.name)?;

        for field in &def.fields {
            let stat = if field.is_static { "static " } else { "" };
            writeln!(w, "    field {stat}{} {}", field.ty, field.name)?;
        }

        for prop in &def.properties {
            for annotation in prop.annotations.iter() {
                writeln!(w, "    {annotation}")?;
            }
            write!(w, "    property {} {}", prop.ty, prop.name)?;
            if let Some(getter) = prop.getter {
                write!(w, " get {}", self.module.funcs[getter].name)?;
            }
            if let Some(setter) = prop.setter {
                write!(w, " set {}", self.module.funcs[setter].name)?;
            }
            writeln!(w)?;
        }

        for &func_ref in &def.methods {
            if !def.fields.is_empty() || !def.properties.is_empty() || func_ref != def.methods[0] {
                writeln!(w)?;
            }
            let mut func_writer = FuncWriter::new(self.module, func_ref);
            func_writer.write(&mut w)?;
        }

        writeln!(w, "}}")
    }

    pub fn dump_string(&mut self) -> io::Result<String> {
        let mut s = Vec::new();
        self.write(&mut s)?;
        String::from_utf8(s).map_err(io::Error::other)
    }
}

pub struct FuncWriter<'a> {
    func: &'a Function,
    members: &'a MemberStore,
    level: u8,
}

impl<'a> FuncWriter<'a> {
    pub fn new(module: &'a Module, func_ref: FuncRef) -> Self {
        Self {
            func: &module.funcs[func_ref],
            members: &module.members,
            level: 1,
        }
    }

    pub fn write(&mut self, mut w: impl io::Write) -> io::Result<()> {
        for annotation in self.func.annotations.iter() {
            self.indent(&mut w)?;
            writeln!(w, "{annotation}")?;
        }

        self.indent(&mut w)?;
        let stat = if self.func.is_static { "static " } else { "" };
        write!(w, "method {stat}{} {}(", self.func.ret_ty, self.func.name)?;
        for (i, (_, param)) in self.func.params().enumerate() {
            if i > 0 {
                write!(w, ", ")?;
            }
            for annotation in param.annotations.iter() {
                write!(w, "{annotation} ")?;
            }
            write!(w, "{} {}", param.ty, param.name)?;
        }
        write!(w, ")")?;

        let Some(body) = &self.func.body else {
            return writeln!(w, ";");
        };

        writeln!(w, " {{")?;
        self.level += 1;

        if !body.locals.is_empty() {
            self.indent(&mut w)?;
            write!(w, ".locals (")?;
            for (i, (local, data)) in body.locals.iter().enumerate() {
                if i > 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{} {}", data.ty, local_name(body, local))?;
            }
            writeln!(w, ")")?;
        }

        let offsets = body.offsets();
        for inst in body.iter_inst() {
            self.indent(&mut w)?;
            write!(w, "{}: ", label(&offsets, inst))?;
            self.write_inst(body, &offsets, &body.insts[inst], &mut w)?;
            writeln!(w)?;
        }

        for handler in &body.handlers {
            self.indent(&mut w)?;
            write_handler(handler, &offsets, &mut w)?;
            writeln!(w)?;
        }

        self.level -= 1;
        self.indent(&mut w)?;
        writeln!(w, "}}")
    }

    pub fn write_inst(
        &self,
        body: &Body,
        offsets: &SecondaryMap<InstId, u32>,
        data: &InstData,
        mut w: impl io::Write,
    ) -> io::Result<()> {
        write!(w, "{}", data.opcode)?;
        match &data.operand {
            Operand::None => Ok(()),
            Operand::Imm(imm) => write!(w, " {imm}"),
            Operand::Arg(arg) => match self.func.args.get(*arg) {
                Some(arg) => write!(w, " {}", arg.name),
                None => write!(w, " {}", arg.index()),
            },
            Operand::Local(local) => write!(w, " {}", local_name(body, *local)),
            Operand::Field(field) => {
                let data = self.members.field_data(*field);
                write!(w, " {} {}::{}", data.ty, data.parent, data.name)
            }
            Operand::Method(method) => {
                let data = self.members.method_data(*method);
                let instance = if data.has_this { "instance " } else { "" };
                write!(
                    w,
                    " {instance}{} {}::{}(",
                    data.ret_ty, data.parent, data.name
                )?;
                for (i, param) in data.params.iter().enumerate() {
                    if i > 0 {
                        write!(w, ", ")?;
                    }
                    write!(w, "{param}")?;
                }
                write!(w, ")")
            }
            Operand::Type(ty) => write!(w, " {ty}"),
            Operand::Target(target) => write!(w, " {}", label(offsets, *target)),
            Operand::Targets(targets) => {
                write!(w, " (")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(w, ", ")?;
                    }
                    write!(w, "{}", label(offsets, *target))?;
                }
                write!(w, ")")
            }
        }
    }

    /// Renders a single instruction of this function, e.g. for diagnostics.
    pub fn inst_text(&self, inst: InstId) -> String {
        let Some(body) = &self.func.body else {
            return String::new();
        };
        let offsets = body.offsets();
        let mut s = Vec::new();
        if self
            .write_inst(body, &offsets, &body.insts[inst], &mut s)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8_lossy(&s).into_owned()
    }

    fn indent(&self, mut w: impl io::Write) -> io::Result<()> {
        for _ in 0..self.level {
            write!(w, "    ")?;
        }
        Ok(())
    }
}

fn local_name(body: &Body, local: crate::body::LocalId) -> String {
    match body.locals.get(local).and_then(|data| data.name.as_ref()) {
        Some(name) => name.to_string(),
        None => format!("V_{}", local.index()),
    }
}

fn label(offsets: &SecondaryMap<InstId, u32>, inst: InstId) -> String {
    format!("IL_{:04x}", offsets[inst])
}

fn write_handler(
    handler: &ExceptionHandler,
    offsets: &SecondaryMap<InstId, u32>,
    mut w: impl io::Write,
) -> io::Result<()> {
    let end = |inst: Option<InstId>| inst.map_or_else(|| "end".to_string(), |i| label(offsets, i));

    write!(
        w,
        ".try {} to {} ",
        label(offsets, handler.try_start),
        end(handler.try_end)
    )?;
    match &handler.kind {
        HandlerKind::Catch(ty) => write!(w, "catch {ty}")?,
        HandlerKind::Finally => write!(w, "finally")?,
        HandlerKind::Fault => write!(w, "fault")?,
    }
    write!(
        w,
        " handler {} to {}",
        label(offsets, handler.handler_start),
        end(handler.handler_end)
    )
}
