use ir::Type;
use pest::Parser as _;
use smol_str::SmolStr;

use super::{syntax::Node, Error};
use crate::syntax::{FromSyntax, Parser, Rule, Spanned};

pub fn parse(input: &str) -> Result<Module, Vec<Error>> {
    match Parser::parse(Rule::module, input) {
        Err(err) => Err(vec![Error::SyntaxError(Box::new(err))]),
        Ok(mut pairs) => {
            let Some(pair) = pairs.next() else {
                return Ok(Module::default());
            };
            debug_assert_eq!(pair.as_rule(), Rule::module);
            let mut node = Node::new(pair);

            let module = Module::from_syntax(&mut node);

            if node.errors.is_empty() {
                Ok(module)
            } else {
                Err(node.errors)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Module {
    pub name: SmolStr,
    pub references: Vec<SmolStr>,
    pub annotations: Vec<SmolStr>,
    pub types: Vec<TypeDef>,
}

impl FromSyntax<Error> for Module {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let name = node
            .descend_into_opt(Rule::module_decl, |n| n.str_of(Rule::dotted_name))
            .flatten()
            .unwrap_or_default()
            .into();

        Module {
            name,
            references: node.multi(Rule::reference),
            annotations: node.multi::<ModuleAnnotation>(Rule::module_annotation)
                .into_iter()
                .map(|a| a.0)
                .collect(),
            types: node.multi(Rule::type_def),
        }
    }
}

impl FromSyntax<Error> for SmolStr {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        match node.str_of(Rule::dotted_name) {
            Some(name) => name.into(),
            None => node.txt.into(),
        }
    }
}

struct ModuleAnnotation(SmolStr);

impl FromSyntax<Error> for ModuleAnnotation {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Self(node.single(Rule::annotation))
    }
}

#[derive(Debug)]
pub struct TypeDef {
    pub annotations: Vec<SmolStr>,
    pub is_value_type: bool,
    pub name: Spanned<SmolStr>,
    pub fields: Vec<Field>,
    pub properties: Vec<Property>,
    pub methods: Vec<Method>,
}

impl FromSyntax<Error> for TypeDef {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let is_value_type = node.get_opt(Rule::value_kw).is_some();
        let name = node.get(Rule::dotted_name);
        let span = name.as_span();

        TypeDef {
            annotations: node.multi(Rule::annotation),
            is_value_type,
            name: Spanned {
                span: crate::Span::from_range(span.start()..span.end()),
                inner: name.as_str().into(),
            },
            fields: node.multi(Rule::field_def),
            properties: node.multi(Rule::property_def),
            methods: node.multi(Rule::method_def),
        }
    }
}

#[derive(Debug)]
pub struct Field {
    pub is_static: bool,
    pub ty: Type,
    pub name: SmolStr,
}

impl FromSyntax<Error> for Field {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Field {
            is_static: node.get_opt(Rule::static_kw).is_some(),
            ty: node.single(Rule::type_name),
            name: node.str_of(Rule::ident).unwrap_or_default().into(),
        }
    }
}

#[derive(Debug)]
pub struct Property {
    pub annotations: Vec<SmolStr>,
    pub ty: Type,
    pub name: SmolStr,
    pub getter: Option<Spanned<SmolStr>>,
    pub setter: Option<Spanned<SmolStr>>,
}

impl FromSyntax<Error> for Property {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Property {
            annotations: node.multi(Rule::annotation),
            ty: node.single(Rule::type_name),
            name: node.str_of(Rule::ident).unwrap_or_default().into(),
            getter: node.single_opt(Rule::getter),
            setter: node.single_opt(Rule::setter),
        }
    }
}

#[derive(Debug)]
pub struct Method {
    pub annotations: Vec<SmolStr>,
    pub is_static: bool,
    pub ret_ty: Type,
    pub name: Spanned<SmolStr>,
    pub params: Vec<Param>,
    pub body: Option<MethodBody>,
}

impl FromSyntax<Error> for Method {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Method {
            annotations: node.multi(Rule::annotation),
            is_static: node.get_opt(Rule::static_kw).is_some(),
            ret_ty: node.single(Rule::type_name),
            name: node.single(Rule::member_name),
            params: node.multi(Rule::param),
            body: node.single_opt(Rule::body),
        }
    }
}

#[derive(Debug)]
pub struct Param {
    pub annotations: Vec<SmolStr>,
    pub ty: Type,
    pub name: SmolStr,
}

impl FromSyntax<Error> for Param {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Param {
            annotations: node.multi(Rule::annotation),
            ty: node.single(Rule::type_name),
            name: node.str_of(Rule::ident).unwrap_or_default().into(),
        }
    }
}

#[derive(Debug)]
pub struct MethodBody {
    pub locals: Vec<LocalDecl>,
    pub insts: Vec<InstLine>,
    pub handlers: Vec<Handler>,
}

impl FromSyntax<Error> for MethodBody {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        MethodBody {
            locals: node
                .descend_into_opt(Rule::locals, |n| n.multi(Rule::local_decl))
                .unwrap_or_default(),
            insts: node.multi(Rule::inst_line),
            handlers: node.multi(Rule::handler),
        }
    }
}

#[derive(Debug)]
pub struct LocalDecl {
    pub ty: Type,
    pub name: Spanned<SmolStr>,
}

impl FromSyntax<Error> for LocalDecl {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        LocalDecl {
            ty: node.single(Rule::type_name),
            name: node.single(Rule::ident),
        }
    }
}

#[derive(Debug)]
pub struct InstLine {
    pub label: Option<Spanned<SmolStr>>,
    pub opcode: Spanned<SmolStr>,
    pub operand: Option<Spanned<OperandSyntax>>,
}

impl FromSyntax<Error> for InstLine {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        InstLine {
            label: node.single_opt(Rule::label),
            opcode: node.single(Rule::opcode),
            operand: node.single_opt(Rule::operand),
        }
    }
}

#[derive(Debug)]
pub enum OperandSyntax {
    Labels(Vec<Spanned<SmolStr>>),
    Str(SmolStr),
    Member(MemberSyntax),
    Number(SmolStr),
    /// A type, or a bare name referring to a local, an argument or a label.
    Type { ty: Type, text: SmolStr },
}

impl FromSyntax<Error> for OperandSyntax {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        node.descend();
        match node.rule {
            Rule::switch_operand => OperandSyntax::Labels(node.multi(Rule::label_ref)),
            Rule::string_lit => {
                let inner = node.str_of(Rule::string_inner).unwrap_or_default();
                OperandSyntax::Str(unescape(inner).into())
            }
            Rule::member_operand => OperandSyntax::Member(MemberSyntax::from_syntax(node)),
            Rule::number => OperandSyntax::Number(node.txt.into()),
            Rule::type_name => {
                let text = node.txt.trim().into();
                OperandSyntax::Type {
                    ty: Type::from_syntax(node),
                    text,
                }
            }
            _ => unreachable!(),
        }
    }
}

#[derive(Debug)]
pub struct MemberSyntax {
    pub has_this: bool,
    pub ty: Type,
    pub parent: Type,
    pub name: SmolStr,
    /// Parameter types, `None` for a field reference.
    pub params: Option<Vec<Type>>,
}

impl FromSyntax<Error> for MemberSyntax {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let has_this = node.get_opt(Rule::instance_kw).is_some();
        let mut types: Vec<Type> = node.multi(Rule::type_name);
        let parent = types.pop().unwrap_or(Type::Void);
        let ty = types.pop().unwrap_or(Type::Void);

        MemberSyntax {
            has_this,
            ty,
            parent,
            name: node.str_of(Rule::member_name).unwrap_or_default().into(),
            params: node.descend_into_opt(Rule::method_params, |n| n.multi(Rule::type_name)),
        }
    }
}

#[derive(Debug)]
pub struct Handler {
    pub try_start: Spanned<SmolStr>,
    pub try_end: Spanned<SmolStr>,
    pub kind: HandlerKindSyntax,
    pub handler_start: Spanned<SmolStr>,
    pub handler_end: Spanned<SmolStr>,
}

#[derive(Debug)]
pub enum HandlerKindSyntax {
    Catch(Type),
    Finally,
    Fault,
}

impl FromSyntax<Error> for Handler {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let mut starts: Vec<Spanned<SmolStr>> = node.multi(Rule::label_ref);
        let mut ends: Vec<Spanned<SmolStr>> = node.multi(Rule::region_end);
        let kind = node
            .descend_into_opt(Rule::handler_kind, |n| {
                n.descend();
                match n.rule {
                    Rule::catch_kind => HandlerKindSyntax::Catch(n.single(Rule::type_name)),
                    Rule::finally_kw => HandlerKindSyntax::Finally,
                    _ => HandlerKindSyntax::Fault,
                }
            })
            .unwrap_or(HandlerKindSyntax::Fault);

        let handler_end = ends.pop();
        let try_end = ends.pop();
        let handler_start = starts.pop();
        let try_start = starts.pop();
        let missing = || Spanned {
            span: node.span,
            inner: SmolStr::default(),
        };

        Handler {
            try_start: try_start.unwrap_or_else(missing),
            try_end: try_end.unwrap_or_else(missing),
            kind,
            handler_start: handler_start.unwrap_or_else(missing),
            handler_end: handler_end.unwrap_or_else(missing),
        }
    }
}

impl FromSyntax<Error> for Type {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let mut ty = if let Some(kw) = node.str_of(Rule::primitive) {
            Type::from_keyword(kw).unwrap_or(Type::Void)
        } else if let Some(param) = node.str_of(Rule::generic_param) {
            match param[1..].parse() {
                Ok(idx) => Type::GenericParam(idx),
                Err(_) => {
                    node.error(Error::NumberOutOfBounds(node.span));
                    Type::Void
                }
            }
        } else {
            node.descend_into_opt(Rule::named_type, |n| {
                let scope = n
                    .descend_into_opt(Rule::scope, |n| n.str_of(Rule::dotted_name))
                    .flatten();
                let name = n.str_of(Rule::dotted_name).unwrap_or_default();
                let args = n
                    .descend_into_opt(Rule::type_args, |n| n.multi(Rule::type_name))
                    .unwrap_or_default();
                Type::generic(scope, name, args)
            })
            .unwrap_or(Type::Void)
        };

        while let Some(suffix) = node.next_pair() {
            ty = match suffix.as_rule() {
                Rule::array_suffix => Type::array_of(ty),
                _ => Type::by_ref(ty),
            };
        }
        ty
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(c) => out.push(c),
            None => out.push('\\'),
        }
    }
    out
}
