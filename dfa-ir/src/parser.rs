//! A parser for the textual IR, useful mostly for testing and for the `dfa` tool.
//!
//! ```text
//! // Declarations end in `;` or in a code block.
//! main hello
//!
//! type i32 i32;
//! type unit unit;
//! field hello.result outer=hello type=i32;
//! routine hello result=hello.result {
//!     const i32 42
//!     current
//!     assign hello.result
//! }
//! ```

use crate::{builder::ProgramBuilder, error::IrError, program::Program};

// -------------------------------------------------------------------------------------------------
/// Parse a textual program into a new, verified [`Program`].
pub fn parse(input: &str) -> Result<Program, IrError> {
    let irprog = ir_builder::parser::ir_descrs(input).map_err(|err| {
        let found = if input.len() - err.location.offset <= 20 {
            &input[err.location.offset..]
        } else {
            &input[err.location.offset..][..20]
        };
        IrError::ParseFailure(err.to_string(), found.into())
    })?;
    let program = ir_builder::build_program(irprog, ProgramBuilder::new())?;
    program.verify()
}

// -------------------------------------------------------------------------------------------------

mod ir_builder {
    use crate::{
        builder::ProgramBuilder,
        code::{Case, Code, Expr},
        entity::{Entity, EntityKind, SpecialEntity},
        error::IrError,
        program::Program,
    };

    peg::parser! {
        pub(in crate::parser) grammar parser() for str {
            pub(in crate::parser) rule ir_descrs() -> IrAstProgram
                = _ decls:decl()* eoi() {
                    let mut main = None;
                    let mut entities = Vec::new();
                    for decl in decls {
                        match decl {
                            IrAstDecl::Main(name) => main = Some(name),
                            IrAstDecl::Entity(entity) => entities.push(entity),
                        }
                    }
                    IrAstProgram { main, entities }
                }

            rule decl() -> IrAstDecl
                = "main" _ name:name() {
                    IrAstDecl::Main(name)
                }
                / kind:entity_kind() name:name() attrs:attr()* body:entity_body() {
                    let (code, precondition) = body;
                    IrAstDecl::Entity(IrAstEntity {
                        kind,
                        name,
                        attrs,
                        code,
                        precondition,
                    })
                }

            rule entity_kind() -> EntityKind
                = "typeparam" _ { EntityKind::TypeParameter }
                / "type" _ { EntityKind::Routine }
                / "routine" _ { EntityKind::Routine }
                / "field" _ { EntityKind::Field }
                / "intrinsic" _ { EntityKind::Intrinsic }
                / "abstract" _ { EntityKind::Abstract }

            rule entity_body() -> (Option<Vec<IrAstInstr>>, Option<Vec<IrAstInstr>>)
                = ";" _ { (None, None) }
                / pre:precondition()? code:block() {
                    (Some(code), pre)
                }

            rule precondition() -> Vec<IrAstInstr>
                = "pre" _ code:block() {
                    code
                }

            rule attr() -> IrAstAttr
                = key:ident() "=" _ value:attr_value() {
                    IrAstAttr::Value(key, value)
                }
                / !("pre" _ "{") flag:ident() {
                    IrAstAttr::Flag(flag)
                }

            rule attr_value() -> IrAstAttrValue
                = "(" _ names:(name() ** comma()) ")" _ {
                    IrAstAttrValue::List(names)
                }
                / s:string() {
                    IrAstAttrValue::Str(s)
                }
                / n:name() {
                    IrAstAttrValue::Name(n)
                }

            rule block() -> Vec<IrAstInstr>
                = "{" _ instrs:instr()* "}" _ {
                    instrs
                }

            rule instr() -> IrAstInstr
                = instr_adr_of()
                / instr_assign()
                / instr_box()
                / instr_unbox()
                / instr_call()
                / instr_current()
                / instr_comment()
                / instr_const()
                / instr_dup()
                / instr_match()
                / instr_tag()
                / instr_env()
                / instr_pop()

            rule instr_adr_of() -> IrAstInstr
                = "adr_of" _ { IrAstInstr::AdrOf }

            rule instr_assign() -> IrAstInstr
                = "assign" _ field:name() opts:access_opt()* {
                    IrAstInstr::Assign(field, opts)
                }

            rule instr_box() -> IrAstInstr
                = "box" _ value:name() result:name() {
                    IrAstInstr::Box(value, result)
                }

            rule instr_unbox() -> IrAstInstr
                = "unbox" _ outer:name() result:name() {
                    IrAstInstr::Unbox(outer, result)
                }

            rule instr_call() -> IrAstInstr
                = "call" _ callee:name() opts:access_opt()* {
                    IrAstInstr::Call(callee, opts)
                }

            rule access_opt() -> IrAstAccessOpt
                = "target" _ "=" _ ty:name() {
                    IrAstAccessOpt::Target(ty)
                }
                / "dynamic" _ "=" _ "(" _ targets:(name() ** comma()) ")" _ {
                    IrAstAccessOpt::Dynamic(targets)
                }
                / "pre_only" _ "=" _ "true" _ {
                    IrAstAccessOpt::PreconditionOnly
                }

            rule instr_current() -> IrAstInstr
                = "current" _ { IrAstInstr::Current }

            rule instr_comment() -> IrAstInstr
                = "comment" _ text:string() {
                    IrAstInstr::Comment(text)
                }

            rule instr_const() -> IrAstInstr
                = "const" _ ty:name() value:const_lit() {
                    IrAstInstr::Const(ty, value)
                }

            rule const_lit() -> IrAstConst
                = "0x" bytes:hex_byte()+ _ {
                    IrAstConst::Bytes(bytes)
                }
                / "true" _ { IrAstConst::Bool(true) }
                / "false" _ { IrAstConst::Bool(false) }
                / s:string() { IrAstConst::Str(s) }
                / n:$("-"? ['0'..='9']+ "." ['0'..='9']+) _ {?
                    n.parse().map(IrAstConst::Float).or(Err("float literal"))
                }
                / n:$("-"? ['0'..='9']+) _ {?
                    n.parse().map(IrAstConst::Int).or(Err("integer literal"))
                }

            rule hex_byte() -> u8
                = h:$(['0'..='9' | 'a'..='f' | 'A'..='F']*<2>) {?
                    u8::from_str_radix(h, 16).or(Err("hex byte"))
                }

            rule instr_dup() -> IrAstInstr
                = "dup" _ { IrAstInstr::Dup }

            rule instr_match() -> IrAstInstr
                = "match" _ subject:name() "{" _ cases:match_case()* "}" _ {
                    IrAstInstr::Match(subject, cases)
                }

            rule match_case() -> IrAstCase
                = "case" _ tags:case_tags()? field:case_field()? code:block() {
                    IrAstCase {
                        tags: tags.unwrap_or_default(),
                        field,
                        code,
                    }
                }

            rule case_tags() -> Vec<u32>
                = "tags" _ "=" _ "(" _ tags:(decimal() ** comma()) ")" _ {
                    tags
                }

            rule case_field() -> String
                = "field" _ "=" _ field:name() {
                    field
                }

            rule instr_tag() -> IrAstInstr
                = "tag" _ value:name() new:name() tag:decimal() {
                    IrAstInstr::Tag(value, new, tag)
                }

            rule instr_env() -> IrAstInstr
                = "env" _ effect:name() {
                    IrAstInstr::Env(effect)
                }

            rule instr_pop() -> IrAstInstr
                = "pop" _ ty:name() {
                    IrAstInstr::Pop(ty)
                }

            rule decimal() -> u32
                = d:$(['0'..='9']+) _ {?
                    d.parse().or(Err("decimal"))
                }

            rule string() -> String
                = "\"" s:$((!['"' | '\n'] [_])*) "\"" _ {
                    s.to_owned()
                }

            rule ident() -> String
                = id:$(id_char0() id_char()*) _ {
                    id.to_owned()
                }

            rule name() -> String
                = id:$(id_char0() name_char()*) _ {
                    id.to_owned()
                }

            rule id_char0()
                = quiet!{ ['A'..='Z' | 'a'..='z' | '_'] }

            rule id_char()
                = quiet!{ id_char0() / ['0'..='9'] }

            rule name_char()
                = quiet!{ id_char() / ['.' | '#' | '$' | '\''] }

            rule comma()
                = quiet!{ "," _ }

            rule _()
                = quiet!{ (space() / nl() / comment())* }

            rule space()
                = [' ' | '\t']

            rule nl()
                = ['\n' | '\r']

            rule comment()
                = "//" (!nl() [_])* nl()

            rule eoi()
                = ![_] / expected!("end of input")
        }
    }

    // - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    pub(super) struct IrAstProgram {
        main: Option<String>,
        entities: Vec<IrAstEntity>,
    }

    enum IrAstDecl {
        Main(String),
        Entity(IrAstEntity),
    }

    struct IrAstEntity {
        kind: EntityKind,
        name: String,
        attrs: Vec<IrAstAttr>,
        code: Option<Vec<IrAstInstr>>,
        precondition: Option<Vec<IrAstInstr>>,
    }

    enum IrAstAttr {
        Flag(String),
        Value(String, IrAstAttrValue),
    }

    enum IrAstAttrValue {
        Name(String),
        Str(String),
        List(Vec<String>),
    }

    enum IrAstInstr {
        AdrOf,
        Assign(String, Vec<IrAstAccessOpt>),
        Box(String, String),
        Unbox(String, String),
        Call(String, Vec<IrAstAccessOpt>),
        Current,
        Comment(String),
        Const(String, IrAstConst),
        Dup,
        Match(String, Vec<IrAstCase>),
        Tag(String, String, u32),
        Env(String),
        Pop(String),
    }

    enum IrAstAccessOpt {
        Target(String),
        Dynamic(Vec<String>),
        PreconditionOnly,
    }

    enum IrAstConst {
        Bytes(Vec<u8>),
        Bool(bool),
        Str(String),
        Float(f64),
        Int(i128),
    }

    struct IrAstCase {
        tags: Vec<u32>,
        field: Option<String>,
        code: Vec<IrAstInstr>,
    }

    // - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    pub(super) fn build_program(
        irprog: IrAstProgram,
        mut builder: ProgramBuilder,
    ) -> Result<Program, IrError> {
        // Declare everything first so attributes and code may refer forward.
        let entities = irprog
            .entities
            .iter()
            .map(|decl| builder.declare(&decl.name, decl.kind))
            .collect::<Result<Vec<_>, _>>()?;

        let mut names = NameResolver {
            builder: &mut builder,
        };
        for (decl, entity) in irprog.entities.iter().zip(&entities) {
            names.apply_attrs(*entity, decl)?;
        }
        // Code last: constants need the special types of their entities.
        for (decl, entity) in irprog.entities.iter().zip(&entities) {
            if let Some(pre) = &decl.precondition {
                let code = names.build_block(*entity, pre)?;
                names.builder.entity(*entity).precondition(code);
            }
            if let Some(body) = &decl.code {
                let code = names.build_block(*entity, body)?;
                names.builder.entity(*entity).code(code);
            }
        }

        let main = irprog.main.ok_or(IrError::MissingMain)?;
        let main = names.resolve(&main)?;
        builder.set_main(main);
        builder.finish()
    }

    struct NameResolver<'a> {
        builder: &'a mut ProgramBuilder,
    }

    impl<'a> NameResolver<'a> {
        fn resolve(&self, name: &str) -> Result<Entity, IrError> {
            self.builder
                .lookup(name)
                .ok_or_else(|| IrError::UnknownEntity(name.to_owned()))
        }

        fn resolve_all(&self, names: &[String]) -> Result<Vec<Entity>, IrError> {
            names.iter().map(|name| self.resolve(name)).collect()
        }

        fn apply_attrs(&mut self, entity: Entity, decl: &IrAstEntity) -> Result<(), IrError> {
            let unknown = |attr: &str| IrError::UnknownAttribute(decl.name.clone(), attr.to_owned());
            for attr in &decl.attrs {
                match attr {
                    IrAstAttr::Flag(flag) => {
                        let b = self.builder.entity(entity);
                        match flag.as_str() {
                            "unit" => b.unit(),
                            "void" => b.void(),
                            "ref" => b.is_ref(),
                            "typeparam" => b.type_parameter(),
                            special => match SpecialEntity::from_name(special) {
                                Some(special) => b.special(special),
                                None => return Err(unknown(flag.as_str())),
                            },
                        };
                    }
                    IrAstAttr::Value(key, IrAstAttrValue::List(names)) => {
                        let list = self.resolve_all(names)?;
                        let b = self.builder.entity(entity);
                        match key.as_str() {
                            "args" => b.args(list),
                            "generics" => b.generics(list),
                            _ => return Err(unknown(key.as_str())),
                        };
                    }
                    IrAstAttr::Value(key, IrAstAttrValue::Str(s)) => match key.as_str() {
                        "name" => {
                            self.builder.entity(entity).intrinsic_name(s);
                        }
                        _ => return Err(unknown(key.as_str())),
                    },
                    IrAstAttr::Value(key, IrAstAttrValue::Name(name)) => {
                        let other = self.resolve(name)?;
                        let b = self.builder.entity(entity);
                        match key.as_str() {
                            "outer" => b.outer(other),
                            "outer_ref" => b.outer_ref(other),
                            "type" | "returns" => b.result_type(other),
                            "result" => b.result_field(other),
                            "call" => b.call_routine(other),
                            "effect" => b.effect(other),
                            _ => return Err(unknown(key.as_str())),
                        };
                    }
                }
            }
            Ok(())
        }

        fn build_block(&mut self, owner: Entity, instrs: &[IrAstInstr]) -> Result<Code, IrError> {
            let exprs = instrs
                .iter()
                .map(|instr| self.build_expr(owner, instr))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(self.builder.code(owner, exprs))
        }

        fn build_expr(&mut self, owner: Entity, instr: &IrAstInstr) -> Result<Expr, IrError> {
            Ok(match instr {
                IrAstInstr::AdrOf => Expr::AdrOf,
                IrAstInstr::Assign(field, opts) => {
                    let (target, dynamic, _) = self.access_opts(opts)?;
                    Expr::Assign {
                        field: self.resolve(field)?,
                        target,
                        dynamic,
                    }
                }
                IrAstInstr::Box(value, result) => Expr::Box {
                    value: self.resolve(value)?,
                    result: self.resolve(result)?,
                },
                IrAstInstr::Unbox(outer, result) => Expr::Unbox {
                    outer: self.resolve(outer)?,
                    result: self.resolve(result)?,
                },
                IrAstInstr::Call(callee, opts) => {
                    let (target, dynamic, precondition_only) = self.access_opts(opts)?;
                    Expr::Call {
                        callee: self.resolve(callee)?,
                        target,
                        dynamic,
                        precondition_only,
                    }
                }
                IrAstInstr::Current => Expr::Current,
                IrAstInstr::Comment(text) => Expr::Comment(text.clone()),
                IrAstInstr::Const(ty, value) => {
                    let ty = self.resolve(ty)?;
                    Expr::Const {
                        ty,
                        data: self.encode_constant(ty, value),
                    }
                }
                IrAstInstr::Dup => Expr::Dup,
                IrAstInstr::Match(subject, cases) => {
                    let subject = self.resolve(subject)?;
                    let cases = cases
                        .iter()
                        .map(|case| {
                            Ok(Case {
                                tags: case.tags.clone(),
                                field: case
                                    .field
                                    .as_deref()
                                    .map(|field| self.resolve(field))
                                    .transpose()?,
                                code: self.build_block(owner, &case.code)?,
                            })
                        })
                        .collect::<Result<Vec<_>, IrError>>()?;
                    Expr::Match { subject, cases }
                }
                IrAstInstr::Tag(value, new, tag) => Expr::Tag {
                    value: self.resolve(value)?,
                    new: self.resolve(new)?,
                    tag: *tag,
                },
                IrAstInstr::Env(effect) => Expr::Env(self.resolve(effect)?),
                IrAstInstr::Pop(ty) => Expr::Pop(self.resolve(ty)?),
            })
        }

        fn access_opts(
            &self,
            opts: &[IrAstAccessOpt],
        ) -> Result<(Option<Entity>, Option<Vec<Entity>>, bool), IrError> {
            let mut target = None;
            let mut dynamic = None;
            let mut precondition_only = false;
            for opt in opts {
                match opt {
                    IrAstAccessOpt::Target(ty) => target = Some(self.resolve(ty)?),
                    IrAstAccessOpt::Dynamic(targets) => {
                        dynamic = Some(self.resolve_all(targets)?)
                    }
                    IrAstAccessOpt::PreconditionOnly => precondition_only = true,
                }
            }
            Ok((target, dynamic, precondition_only))
        }

        /// Numbers are encoded little endian in the width of the constant's type.
        fn encode_constant(&self, ty: Entity, value: &IrAstConst) -> Vec<u8> {
            let special = self.builder.special_of(ty);
            match value {
                IrAstConst::Bytes(bytes) => bytes.clone(),
                IrAstConst::Bool(b) => vec![u8::from(*b)],
                IrAstConst::Str(s) => s.as_bytes().to_vec(),
                IrAstConst::Float(f) => match special {
                    Some(SpecialEntity::F32) => (*f as f32).to_le_bytes().to_vec(),
                    _ => f.to_le_bytes().to_vec(),
                },
                IrAstConst::Int(i) => match special {
                    Some(SpecialEntity::F32) => (*i as f32).to_le_bytes().to_vec(),
                    Some(SpecialEntity::F64) => (*i as f64).to_le_bytes().to_vec(),
                    Some(special) => i.to_le_bytes()[..special.size_in_bytes()].to_vec(),
                    None => i.to_le_bytes()[..8].to_vec(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{code::ExprKind, entity::EntityKind, ir::Ir};
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_routine_with_result() {
        let program = parse(
            r#"
            main hello

            type i32 i32;
            field hello.result outer=hello type=i32;
            routine hello result=hello.result {
                const i32 42
                current
                assign hello.result
            }
            "#,
        )
        .unwrap();

        let hello = program.entity_by_name("hello").unwrap();
        assert_eq!(program.main_entity(), hello);
        assert_eq!(program.entity_kind(hello), EntityKind::Routine);

        let code = program.entity_code(hello).unwrap();
        let kinds = program
            .code_sites(code)
            .into_iter()
            .map(|site| program.code_at(site))
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![ExprKind::Const, ExprKind::Current, ExprKind::Assign]);

        let first = program.code_start(code);
        assert_eq!(program.constant_data(first), &[42, 0, 0, 0]);
        let i32_ty = program.entity_by_name("i32").unwrap();
        assert_eq!(program.result_entity(hello), i32_ty);
    }

    #[test]
    fn parse_match_and_precondition() {
        let program = parse(
            r#"
            main m
            type unit unit;
            type bool bool;
            type opt;
            field m.x outer=m type=bool;
            routine g;
            routine m pre {
                call g
            } {
                const bool true
                match bool {
                    case tags=(1) field=m.x {
                        call g
                    }
                    case tags=(0) {
                    }
                }
            }
            "#,
        )
        .unwrap();

        let m = program.entity_by_name("m").unwrap();
        assert!(program.declares_precondition(m));
        let code = program.entity_code(m).unwrap();
        let site = program.last_site(code).unwrap();
        assert_eq!(program.code_at(site), ExprKind::Match);
        assert_eq!(program.match_case_count(site), 2);
        assert_eq!(program.match_case_tags(site, 0), &[1]);
        assert_eq!(
            program.match_case_field(site, 0),
            program.entity_by_name("m.x")
        );
        assert!(program.code_sites(program.match_case_code(site, 1)).is_empty());
        assert_eq!(program.site_entity(site), m);
    }

    #[test]
    fn empty_dynamic_target_list_is_still_dynamic() {
        let program = parse(
            r#"
            main m
            abstract shape.area;
            routine circle {
            }
            routine m {
                call shape.area dynamic=()
                call shape.area dynamic=(circle)
                call shape.area
            }
            "#,
        )
        .unwrap();

        let code = program.entity_code(program.main_entity()).unwrap();
        let sites = program.code_sites(code);
        let dynamic = sites
            .iter()
            .map(|site| program.access_is_dynamic(*site))
            .collect::<Vec<_>>();
        assert_eq!(dynamic, vec![true, true, false]);
        assert!(program.accessed_entities(sites[0]).is_empty());
        assert_eq!(
            program.accessed_entities(sites[1]),
            &[program.entity_by_name("circle").unwrap()]
        );
        assert!(program.accessed_entities(sites[2]).is_empty());
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let err = parse("main m\nroutine m {\n call nowhere\n}\n").unwrap_err();
        assert_eq!(err, crate::error::IrError::UnknownEntity("nowhere".to_owned()));
    }

    #[test]
    fn missing_main_is_an_error() {
        let err = parse("routine m {\n}\n").unwrap_err();
        assert_eq!(err, crate::error::IrError::MissingMain);
    }

    #[test]
    fn negative_constants_are_twos_complement() {
        let program =
            parse("main m\ntype i16 i16;\nroutine m {\n const i16 -2\n pop i16\n}\n").unwrap();
        let code = program.entity_code(program.main_entity()).unwrap();
        assert_eq!(program.constant_data(program.code_start(code)), &[0xfe, 0xff]);
    }
}
