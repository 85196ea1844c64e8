use std::io;

use annotate_snippets::{AnnotationKind, Level, Renderer, Snippet};
use ir::OperandKind;
use smol_str::SmolStr;

use crate::{syntax::Rule, Span};

#[derive(Debug)]
pub enum Error {
    NumberOutOfBounds(Span),
    SyntaxError(Box<pest::error::Error<Rule>>),
    Undefined(UndefinedKind, Span),
    DuplicatedDeclaration(SmolStr, Span),

    OperandKindMismatch {
        expected: OperandKind,
        span: Span,
    },

    UnexpectedOperand(Span),
}

#[derive(Debug)]
pub enum UndefinedKind {
    Label(SmolStr),
    Local(SmolStr),
    Arg(SmolStr),
    Method(SmolStr),
    Opcode(SmolStr),
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Error::NumberOutOfBounds(span) => *span,
            Error::Undefined(_, span) => *span,
            Error::DuplicatedDeclaration(_, span) => *span,

            Error::SyntaxError(err) => match err.location {
                pest::error::InputLocation::Pos(p) => Span(p as u32, p as u32),
                pest::error::InputLocation::Span((s, e)) => Span(s as u32, e as u32),
            },
            Error::OperandKindMismatch { span, .. } => *span,
            Error::UnexpectedOperand(span) => *span,
        }
    }

    /// Short description of the error, without source context.
    pub fn message(&self) -> String {
        match self {
            Error::NumberOutOfBounds(_) => "number out of bounds".into(),

            Error::SyntaxError(err) => err.variant.message().into_owned(),

            Error::Undefined(kind, _) => match kind {
                UndefinedKind::Label(name) => format!("undefined label: `{name}`"),
                UndefinedKind::Local(name) => format!("undefined local: `{name}`"),
                UndefinedKind::Arg(name) => format!("undefined argument: `{name}`"),
                UndefinedKind::Method(name) => format!("undefined method: `{name}`"),
                UndefinedKind::Opcode(name) => format!("unknown opcode: `{name}`"),
            },

            Error::DuplicatedDeclaration(name, _) => format!("{name} is already declared"),

            Error::OperandKindMismatch { expected, .. } => {
                format!("operand kind mismatch: expected {}", operand_desc(*expected))
            }

            Error::UnexpectedOperand(_) => "unexpected operand".to_string(),
        }
    }

    pub fn print(
        &self,
        mut w: impl io::Write,
        path: &str,
        content: &str,
        colors: bool,
    ) -> io::Result<()> {
        let label = self.message();
        let snippet = Level::ERROR.primary_title("parse error").element(
            Snippet::source(content)
                .line_start(0)
                .path(path)
                .fold(true)
                .annotation(
                    AnnotationKind::Primary
                        .span(self.span().as_range())
                        .label(label.as_str()),
                ),
        );
        let rend = if colors {
            Renderer::styled()
        } else {
            Renderer::plain()
        };
        let disp = rend.render(&[snippet]);
        writeln!(w, "{disp}")
    }

    pub fn print_to_string(&self, path: &str, content: &str, colors: bool) -> String {
        let mut v = vec![];
        if self.print(&mut v, path, content, colors).is_err() {
            return self.message();
        }
        String::from_utf8_lossy(&v).into_owned()
    }
}

fn operand_desc(kind: OperandKind) -> &'static str {
    match kind {
        OperandKind::None => "no operand",
        OperandKind::ShortArg | OperandKind::Arg => "an argument",
        OperandKind::ShortLocal | OperandKind::Local => "a local",
        OperandKind::ShortI4 | OperandKind::I4 | OperandKind::I8 => "an integer",
        OperandKind::R4 | OperandKind::R8 => "a number",
        OperandKind::String => "a string literal",
        OperandKind::Field => "a field reference",
        OperandKind::Method => "a method reference",
        OperandKind::Type => "a type",
        OperandKind::ShortTarget | OperandKind::Target => "a label",
        OperandKind::Switch => "a label list",
    }
}
