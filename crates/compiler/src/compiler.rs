//! The single-pass compiler (spec.md §4.3).
//!
//! One left-to-right walk over the token stream resolves names, type-checks
//! against a compile-time type stack that mirrors the runtime operand stack,
//! and emits bytecode directly — there is no intermediate AST. Per-module
//! token-stream state lives in `Parser`, which borrows only the source text
//! of the module currently being compiled; an import recurses into
//! `Compiler::compile_module` with a fresh `Parser` over its own source, so
//! nesting never entangles lifetimes across modules.

use std::collections::HashSet;
use std::path::PathBuf;

use opo_core::{is_assignable, Chunk, Kind, NativeSig, OpCode, TypeDesc};

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::resolver::{module_key, resolve_import_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assign,
    Postfix,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assign,
            Assign => Postfix,
            Postfix => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type PrefixFn = fn(&mut Compiler, &mut Parser) -> TypeDesc;
type InfixFn = fn(&mut Compiler, &mut Parser, TypeDesc) -> TypeDesc;

struct ParseRule {
    prefix: Option<PrefixFn>,
    infix: Option<InfixFn>,
    precedence: Precedence,
}

fn get_rule(kind: TokenKind) -> ParseRule {
    use TokenKind::*;
    match kind {
        Int | Flt => ParseRule { prefix: Some(number), infix: None, precedence: Precedence::None },
        Str => ParseRule { prefix: Some(string_lit), infix: None, precedence: Precedence::None },
        True | False => ParseRule { prefix: Some(bool_lit), infix: None, precedence: Precedence::None },
        Ident => ParseRule { prefix: Some(variable), infix: None, precedence: Precedence::None },
        LParen => ParseRule { prefix: Some(grouping), infix: None, precedence: Precedence::None },
        LBracket => ParseRule { prefix: Some(array_literal), infix: None, precedence: Precedence::None },
        LBrace => ParseRule { prefix: Some(map_literal), infix: None, precedence: Precedence::None },
        Minus => ParseRule { prefix: Some(unary), infix: Some(binary), precedence: Precedence::Term },
        Plus => ParseRule { prefix: None, infix: Some(binary), precedence: Precedence::Term },
        Star | Slash | Percent => ParseRule { prefix: None, infix: Some(binary), precedence: Precedence::Factor },
        Bang => ParseRule { prefix: Some(unary), infix: None, precedence: Precedence::None },
        EqEq | NotEq => ParseRule { prefix: None, infix: Some(binary), precedence: Precedence::Equality },
        LAngle | RAngle | Lte | Gte => {
            ParseRule { prefix: None, infix: Some(binary), precedence: Precedence::Comparison }
        }
        AndAnd => ParseRule { prefix: None, infix: Some(logical), precedence: Precedence::And },
        OrOr => ParseRule { prefix: None, infix: Some(logical), precedence: Precedence::Or },
        BangBang => ParseRule { prefix: None, infix: Some(print_op), precedence: Precedence::Postfix },
        Dot => ParseRule { prefix: None, infix: Some(dot), precedence: Precedence::Call },
        LeftArrow => ParseRule { prefix: Some(recv), infix: Some(send), precedence: Precedence::Term },
        Some => ParseRule { prefix: Some(some_expr), infix: None, precedence: Precedence::None },
        None => ParseRule { prefix: Some(none_expr), infix: None, precedence: Precedence::None },
        Chan => ParseRule { prefix: Some(chan_ctor), infix: None, precedence: Precedence::None },
        Go => ParseRule { prefix: Some(go_expr), infix: None, precedence: Precedence::None },
        _ => ParseRule { prefix: None, infix: None, precedence: Precedence::None },
    }
}

/// A user-defined function as visible to call sites.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub address: i64,
    pub return_type: TypeDesc,
    pub param_types: Vec<TypeDesc>,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<String>,
    pub field_types: Vec<TypeDesc>,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub name: String,
    pub payload: Option<TypeDesc>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub id: u8,
    pub variants: Vec<EnumVariant>,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
struct Local {
    name: String,
    ty: TypeDesc,
    depth: i32,
    /// Scope depth at which `.some`/payload access on this local is safe,
    /// or -1 if unguarded (spec.md §4.3 "Narrowing").
    guarded_depth: i32,
    guarded_variant: u8,
    /// Name of the struct this local's value was built from, tracked
    /// alongside `ty` since structs share one generic `TypeDesc` (§3's
    /// loose `obj` kind covers strings, maps, and structs alike).
    struct_name: Option<String>,
}

struct LoopCtx {
    continue_target: usize,
    break_jumps: Vec<usize>,
}

/// Per-module token-stream state. Lives only for the duration of one
/// `compile_module` call.
struct Parser<'a> {
    lexer: Lexer<'a>,
    previous: Token,
    current: Token,
    source_name: String,
    /// Prefix every name declared in this module gains, e.g. `"math."` for
    /// `"std/math" => math : imp`. Empty for the root module.
    prefix: String,
}

pub struct Compiler {
    chunk: Chunk,
    functions: Vec<FunctionDef>,
    structs: Vec<StructDef>,
    enums: Vec<EnumDef>,
    natives: Vec<NativeSig>,
    aliases: HashSet<String>,
    next_enum_id: u8,
    config: CompilerConfig,
    compiled_modules: HashSet<PathBuf>,
    import_stack: Vec<PathBuf>,

    locals: Vec<Local>,
    scope_depth: i32,
    type_stack: Vec<TypeDesc>,
    loops: Vec<LoopCtx>,
    current_return_type: Option<TypeDesc>,

    /// Set by `variable()` when the just-parsed primary was a bare local
    /// reference; cleared by every other prefix/infix production. Lets
    /// narrowing and struct mutation find "which local" a value came from
    /// without threading it through the type stack itself.
    last_simple_local: Option<usize>,
    last_simple_struct: Option<String>,

    had_error: bool,
    panic_mode: bool,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Compiler {
        let mut c = Compiler {
            chunk: Chunk::new(),
            functions: Vec::new(),
            structs: Vec::new(),
            enums: Vec::new(),
            natives: opo_core::natives::table(),
            aliases: HashSet::new(),
            next_enum_id: opo_core::limits::OPTION_ENUM_ID + 1,
            config,
            compiled_modules: HashSet::new(),
            import_stack: Vec::new(),
            locals: Vec::new(),
            scope_depth: 0,
            type_stack: Vec::new(),
            loops: Vec::new(),
            current_return_type: None,
            last_simple_local: None,
            last_simple_struct: None,
            had_error: false,
            panic_mode: false,
        };
        c.enums.push(EnumDef {
            name: "Option".to_string(),
            id: opo_core::limits::OPTION_ENUM_ID,
            variants: vec![
                EnumVariant { name: "none".to_string(), payload: None },
                EnumVariant { name: "some".to_string(), payload: Some(TypeDesc::Any) },
            ],
            is_public: true,
        });
        c
    }

    /// Compile one program: the root module plus every import it pulls in,
    /// followed by a synthetic call into `main`.
    pub fn compile(mut self, source: &str, source_name: &str) -> Result<Chunk, CompileError> {
        let root_key = module_key(&PathBuf::from(source_name));
        self.compiled_modules.insert(root_key);

        self.compile_module(source, source_name, "");

        match self.functions.iter().find(|f| f.name == "main").cloned() {
            Some(f) => {
                if !f.param_types.is_empty() {
                    self.had_error = true;
                    eprintln!("[{source_name}] Error: 'main' must take no parameters.");
                }
                self.chunk.emit_op(OpCode::Call, 0);
                self.chunk.emit_i32(f.address as i32, 0);
                self.chunk.emit_op(OpCode::Halt, 0);
            }
            None => {
                self.had_error = true;
                eprintln!("[{source_name}] Error: missing 'main' function.");
            }
        }

        if self.had_error {
            Err(CompileError::Logic(format!("[{source_name}] compilation failed")))
        } else {
            Ok(self.chunk)
        }
    }

    fn compile_module(&mut self, source: &str, source_name: &str, prefix: &str) {
        let eof = Token { kind: TokenKind::Eof, lexeme: String::new(), line: 0 };
        let mut p = Parser {
            lexer: Lexer::new(source),
            previous: eof.clone(),
            current: eof,
            source_name: source_name.to_string(),
            prefix: prefix.to_string(),
        };
        self.advance(&mut p);
        while !self.check(&p, TokenKind::Eof) {
            self.item(&mut p);
            if self.panic_mode {
                self.synchronize_top(&mut p);
            }
        }
    }

    // ---- token stream helpers ----

    fn advance(&mut self, p: &mut Parser) {
        p.previous = p.current.clone();
        loop {
            p.current = p.lexer.next_token();
            if p.current.kind != TokenKind::Error {
                break;
            }
            let msg = p.current.lexeme.clone();
            self.error_at_current(p, &msg);
        }
    }

    fn check(&self, p: &Parser, kind: TokenKind) -> bool {
        p.current.kind == kind
    }

    fn match_tok(&mut self, p: &mut Parser, kind: TokenKind) -> bool {
        if self.check(p, kind) {
            self.advance(p);
            true
        } else {
            false
        }
    }

    fn consume(&mut self, p: &mut Parser, kind: TokenKind, message: &str) {
        if p.current.kind == kind {
            self.advance(p);
        } else {
            self.error_at_current(p, message);
        }
    }

    fn error_at(&mut self, p: &Parser, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let lexeme = if token.kind == TokenKind::Eof { "end".to_string() } else { token.lexeme.clone() };
        eprintln!("[{}:line {}] Error at '{}': {}", p.source_name, token.line, lexeme, message);
    }

    fn error_at_current(&mut self, p: &Parser, message: &str) {
        let tok = p.current.clone();
        self.error_at(p, &tok, message);
    }

    fn error_at_previous(&mut self, p: &Parser, message: &str) {
        let tok = p.previous.clone();
        self.error_at(p, &tok, message);
    }

    fn synchronize_top(&mut self, p: &mut Parser) {
        self.panic_mode = false;
        while !self.check(p, TokenKind::Eof) {
            if p.previous.kind == TokenKind::Semicolon {
                return;
            }
            match p.current.kind {
                TokenKind::Struct | TokenKind::Enum | TokenKind::LAngle | TokenKind::Pub | TokenKind::Str => return,
                _ => {}
            }
            self.advance(p);
        }
    }

    fn synchronize_in_block(&mut self, p: &mut Parser) {
        self.panic_mode = false;
        while !self.check(p, TokenKind::RBracket) && !self.check(p, TokenKind::Eof) {
            if p.previous.kind == TokenKind::Semicolon {
                return;
            }
            self.advance(p);
        }
    }

    // ---- type-stack bookkeeping ----

    fn type_push(&mut self, ty: TypeDesc) {
        self.type_stack.push(ty);
    }

    fn type_pop(&mut self, p: &Parser, msg: &str) -> TypeDesc {
        match self.type_stack.pop() {
            Some(ty) => ty,
            None => {
                if !msg.is_empty() {
                    self.error_at_previous_pub(p, msg);
                }
                TypeDesc::Any
            }
        }
    }

    fn error_at_previous_pub(&self, _p: &Parser, _msg: &str) {
        // type-stack underflow indicates a compiler bug, not a user error;
        // kept silent rather than surfacing an internal-error message.
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(last) = self.locals.last() {
            if last.depth > self.scope_depth {
                self.locals.pop();
            } else {
                break;
            }
        }
    }

    fn resolve_local_by_name(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|l| l.name == name)
    }

    fn field_lookup(&self, struct_name: Option<&str>, field: &str) -> Option<(usize, TypeDesc)> {
        let name = struct_name?;
        let sd = self.structs.iter().find(|s| s.name == name)?;
        let idx = sd.fields.iter().position(|f| f == field)?;
        Some((idx, sd.field_types[idx].clone()))
    }

    fn numeric_match(&self, a: &TypeDesc, b: &TypeDesc) -> bool {
        matches!((a, b), (TypeDesc::Int, TypeDesc::Int) | (TypeDesc::Flt, TypeDesc::Flt))
    }

    fn func_kind_byte(ret: &TypeDesc) -> u8 {
        match ret {
            TypeDesc::Int => Kind::FuncInt as u8,
            TypeDesc::Flt => Kind::FuncFlt as u8,
            TypeDesc::Bool => Kind::FuncBool as u8,
            TypeDesc::Str => Kind::FuncStr as u8,
            TypeDesc::Void => Kind::FuncVoid as u8,
            _ => Kind::Func as u8,
        }
    }

    // ---- types ----

    fn parse_type(&mut self, p: &mut Parser) -> TypeDesc {
        self.parse_type_full(p).0
    }

    fn parse_type_full(&mut self, p: &mut Parser) -> (TypeDesc, Option<String>) {
        let (bare, name) = self.parse_type_bare(p);
        if self.match_tok(p, TokenKind::Question) {
            (TypeDesc::option_of(bare), None)
        } else {
            (bare, name)
        }
    }

    fn parse_type_bare(&mut self, p: &mut Parser) -> (TypeDesc, Option<String>) {
        if self.match_tok(p, TokenKind::LBracket) {
            self.consume(p, TokenKind::RBracket, "Expect ']' in array type.");
            let inner = self.parse_type(p);
            return (TypeDesc::Array(Box::new(inner)), None);
        }
        if self.match_tok(p, TokenKind::LBrace) {
            let key = self.parse_type(p);
            self.consume(p, TokenKind::Colon, "Expect ':' in map type.");
            let value = self.parse_type(p);
            self.consume(p, TokenKind::RBrace, "Expect '}' in map type.");
            return (TypeDesc::Map(Box::new(key), Box::new(value)), None);
        }
        if self.match_tok(p, TokenKind::Chan) {
            self.consume(p, TokenKind::LAngle, "Expect '<' after 'chan'.");
            let inner = self.parse_type(p);
            self.consume(p, TokenKind::RAngle, "Expect '>' to close channel type.");
            return (TypeDesc::Chan(Box::new(inner)), None);
        }
        if self.match_tok(p, TokenKind::LAngle) {
            while !self.check(p, TokenKind::RAngle) && !self.check(p, TokenKind::Eof) {
                self.parse_type(p);
                if !self.match_tok(p, TokenKind::Comma) {
                    break;
                }
            }
            self.consume(p, TokenKind::RAngle, "Expect '>' to close function type.");
            self.consume(p, TokenKind::Arrow, "Expect '->' in function type.");
            let ret = self.parse_type(p);
            return (TypeDesc::Func(Some(Box::new(ret))), None);
        }
        if self.match_tok(p, TokenKind::Imp) {
            return (TypeDesc::Imp, None);
        }
        if self.match_tok(p, TokenKind::Err) {
            return (TypeDesc::Err, None);
        }
        if self.match_tok(p, TokenKind::Type) {
            return (TypeDesc::Void, None);
        }

        let name_tok = p.current.clone();
        self.consume(p, TokenKind::Ident, "Expect type name.");
        match name_tok.lexeme.as_str() {
            "int" => (TypeDesc::Int, None),
            "flt" => (TypeDesc::Flt, None),
            "bol" => (TypeDesc::Bool, None),
            "str" => (TypeDesc::Str, None),
            "void" => (TypeDesc::Void, None),
            "any" => (TypeDesc::Any, None),
            other => {
                if self.structs.iter().any(|s| s.name == other) {
                    (TypeDesc::Array(Box::new(TypeDesc::Any)), Some(other.to_string()))
                } else if let Some(e) = self.enums.iter().find(|e| e.name == other) {
                    (TypeDesc::Enum(e.id, None), None)
                } else {
                    self.error_at_previous(p, &format!("Unknown type '{other}'."));
                    (TypeDesc::Any, None)
                }
            }
        }
    }

    // ---- top-level items ----

    fn item(&mut self, p: &mut Parser) {
        let is_public = self.match_tok(p, TokenKind::Pub);
        if self.check(p, TokenKind::Struct) {
            self.struct_def(p, is_public);
        } else if self.check(p, TokenKind::Enum) {
            self.enum_def(p, is_public);
        } else if self.check(p, TokenKind::LAngle) {
            self.func_def(p, is_public);
        } else if self.check(p, TokenKind::Str) {
            self.import_item(p);
        } else {
            self.error_at_current(p, "Expect a top-level item (struct, enum, function, or import).");
            self.advance(p);
        }
        self.match_tok(p, TokenKind::Semicolon);
    }

    fn struct_def(&mut self, p: &mut Parser, is_public: bool) {
        self.advance(p); // 'struct'
        self.consume(p, TokenKind::LBracket, "Expect '[' after 'struct'.");
        let mut fields = Vec::new();
        let mut field_types = Vec::new();
        while !self.check(p, TokenKind::RBracket) && !self.check(p, TokenKind::Eof) {
            let field_tok = p.current.clone();
            self.consume(p, TokenKind::Ident, "Expect field name.");
            self.consume(p, TokenKind::Colon, "Expect ':' after field name.");
            let ty = self.parse_type(p);
            fields.push(field_tok.lexeme);
            field_types.push(ty);
            if !self.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
        self.consume(p, TokenKind::RBracket, "Expect ']' to close struct fields.");
        self.consume(p, TokenKind::FatArrow, "Expect '=>' after struct body.");
        let name_tok = p.current.clone();
        self.consume(p, TokenKind::Ident, "Expect struct name.");
        self.consume(p, TokenKind::Colon, "Expect ':' after struct name.");
        self.consume(p, TokenKind::Type, "Expect 'type' to close struct definition.");

        if self.structs.len() >= self.config.max_structs {
            self.error_at(p, &name_tok, "Too many struct definitions.");
            return;
        }
        if fields.len() > opo_core::limits::MAX_STRUCT_FIELDS {
            self.error_at(p, &name_tok, "Too many struct fields.");
        }
        self.structs.push(StructDef {
            name: format!("{}{}", p.prefix, name_tok.lexeme),
            fields,
            field_types,
            is_public,
        });
    }

    fn enum_def(&mut self, p: &mut Parser, is_public: bool) {
        self.advance(p); // 'enum'
        self.consume(p, TokenKind::LBracket, "Expect '[' after 'enum'.");
        let mut variants = Vec::new();
        while !self.check(p, TokenKind::RBracket) && !self.check(p, TokenKind::Eof) {
            let variant_tok = p.current.clone();
            self.consume(p, TokenKind::Ident, "Expect variant name.");
            let payload = if self.match_tok(p, TokenKind::LParen) {
                let ty = self.parse_type(p);
                self.consume(p, TokenKind::RParen, "Expect ')' after variant payload type.");
                Some(ty)
            } else {
                None
            };
            variants.push(EnumVariant { name: variant_tok.lexeme, payload });
            if !self.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
        self.consume(p, TokenKind::RBracket, "Expect ']' to close enum variants.");
        self.consume(p, TokenKind::FatArrow, "Expect '=>' after enum body.");
        let name_tok = p.current.clone();
        self.consume(p, TokenKind::Ident, "Expect enum name.");
        self.consume(p, TokenKind::Colon, "Expect ':' after enum name.");
        self.consume(p, TokenKind::Type, "Expect 'type' to close enum definition.");

        if self.enums.len() >= self.config.max_enums {
            self.error_at(p, &name_tok, "Too many enum definitions.");
            return;
        }
        if variants.len() > opo_core::limits::MAX_STRUCT_FIELDS {
            self.error_at(p, &name_tok, "Too many enum variants.");
        }
        let id = self.next_enum_id;
        self.next_enum_id += 1;
        self.enums.push(EnumDef {
            name: format!("{}{}", p.prefix, name_tok.lexeme),
            id,
            variants,
            is_public,
        });
    }

    fn func_def(&mut self, p: &mut Parser, is_public: bool) {
        self.advance(p); // '<'
        let mut param_names = Vec::new();
        let mut param_types = Vec::new();
        while !self.check(p, TokenKind::RAngle) && !self.check(p, TokenKind::Eof) {
            let name_tok = p.current.clone();
            self.consume(p, TokenKind::Ident, "Expect parameter name.");
            self.consume(p, TokenKind::Colon, "Expect ':' after parameter name.");
            let ty = self.parse_type(p);
            param_names.push(name_tok.lexeme);
            param_types.push(ty);
            if !self.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
        self.consume(p, TokenKind::RAngle, "Expect '>' to close parameter list.");
        self.consume(p, TokenKind::Arrow, "Expect '->' after parameter list.");
        let return_type = self.parse_type(p);
        self.consume(p, TokenKind::Colon, "Expect ':' after return type.");
        let name_tok = p.current.clone();
        self.consume(p, TokenKind::Ident, "Expect function name.");

        if param_names.len() > opo_core::limits::MAX_FUNC_PARAMS {
            self.error_at(p, &name_tok, "Too many parameters.");
        }
        if self.functions.len() >= self.config.max_functions {
            self.error_at(p, &name_tok, "Too many function definitions.");
            return;
        }

        // The body is compiled inline, fenced by a jump that skips it when
        // control simply falls through the top level (spec.md §4.3
        // "Function layout").
        self.chunk.emit_op(OpCode::Jump, name_tok.line);
        let skip_at = self.chunk.emit_i32_placeholder(name_tok.line);
        let address = self.chunk.here() as i64;

        self.functions.push(FunctionDef {
            name: format!("{}{}", p.prefix, name_tok.lexeme),
            address,
            return_type: return_type.clone(),
            param_types: param_types.clone(),
            is_public,
        });

        self.locals.clear();
        self.scope_depth = 0;
        self.type_stack.clear();
        self.loops.clear();
        self.current_return_type = Some(return_type.clone());

        self.begin_scope();
        for (pname, pty) in param_names.iter().zip(param_types.iter()) {
            self.locals.push(Local {
                name: pname.clone(),
                ty: pty.clone(),
                depth: self.scope_depth,
                guarded_depth: -1,
                guarded_variant: 0,
                struct_name: None,
            });
        }
        // Arguments were pushed in call order; store them into locals in
        // reverse so the first parameter lands in local 0.
        for i in (0..param_names.len()).rev() {
            self.chunk.emit_op(OpCode::Store, name_tok.line);
            self.chunk.emit_byte(i as u8, name_tok.line);
        }

        self.consume(p, TokenKind::LBracket, "Expect '[' to start function body.");
        self.block(p);

        if !matches!(return_type, TypeDesc::Void) && self.type_stack.is_empty() {
            self.error_at(p, &name_tok, "Function must leave a return value on every path.");
        }
        self.chunk.emit_op(OpCode::Ret, name_tok.line);

        let after = self.chunk.here() as i32;
        self.chunk.patch_i32(skip_at, after);
        self.current_return_type = None;
    }

    fn import_item(&mut self, p: &mut Parser) {
        let path_tok = p.current.clone();
        self.advance(p); // string literal
        self.consume(p, TokenKind::FatArrow, "Expect '=>' after import path.");
        let alias_tok = p.current.clone();
        self.consume(p, TokenKind::Ident, "Expect alias name after '=>'.");
        self.consume(p, TokenKind::Colon, "Expect ':' after import alias.");
        self.consume(p, TokenKind::Imp, "Expect 'imp' to close import.");

        let raw_path = path_tok.lexeme.clone();
        let resolved = resolve_import_path(&raw_path, &self.config);
        let key = module_key(&resolved);
        tracing::debug!(raw_path = %raw_path, resolved = %resolved.display(), "resolving import");

        if self.import_stack.contains(&key) {
            self.error_at(p, &path_tok, &format!("cyclic import of '{raw_path}'."));
            return;
        }
        self.aliases.insert(alias_tok.lexeme.clone());
        if self.compiled_modules.contains(&key) {
            tracing::debug!(resolved = %resolved.display(), "module already compiled, skipping");
            return;
        }
        self.compiled_modules.insert(key.clone());

        let text = match std::fs::read_to_string(&resolved) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(resolved = %resolved.display(), error = %e, "failed to read import");
                self.error_at(p, &path_tok, &format!("cannot read import '{raw_path}': {e}"));
                return;
            }
        };

        self.import_stack.push(key);
        let child_prefix = format!("{}{}.", p.prefix, alias_tok.lexeme);
        let source_name = resolved.display().to_string();
        self.compile_module(&text, &source_name, &child_prefix);
        self.import_stack.pop();
    }

    // ---- blocks & statements ----

    fn block(&mut self, p: &mut Parser) {
        self.begin_scope();
        while !self.check(p, TokenKind::RBracket) && !self.check(p, TokenKind::Eof) {
            self.statement(p);
            self.match_tok(p, TokenKind::Semicolon);
            if self.panic_mode {
                self.synchronize_in_block(p);
            }
        }
        self.consume(p, TokenKind::RBracket, "Expect ']' to close block.");
        self.end_scope();
    }

    /// A conditional/while branch is either a bracketed block or a single
    /// statement (spec.md §4.3); returns the type left behind by a lone
    /// value-producing statement, if any.
    fn branch(&mut self, p: &mut Parser) -> Option<TypeDesc> {
        if self.check(p, TokenKind::LBracket) {
            self.advance(p);
            self.block(p);
            None
        } else {
            let before = self.type_stack.len();
            self.statement(p);
            if self.type_stack.len() == before + 1 {
                self.type_stack.pop()
            } else {
                None
            }
        }
    }

    fn statement(&mut self, p: &mut Parser) {
        if self.check(p, TokenKind::FatArrow) {
            self.mutate_statement(p);
        } else if self.check(p, TokenKind::Dot) {
            self.break_statement(p);
        } else if self.check(p, TokenKind::DotDot) {
            self.continue_statement(p);
        } else if self.check(p, TokenKind::Caret) {
            self.return_statement(p);
        } else if self.check(p, TokenKind::Try) {
            self.try_statement(p);
        } else if self.check(p, TokenKind::Throw) {
            self.throw_statement(p);
        } else if self.check(p, TokenKind::Match) {
            self.match_statement(p);
        } else {
            self.expression_statement(p);
        }
    }

    fn expression_statement(&mut self, p: &mut Parser) {
        let loop_start = self.chunk.here();
        let before = self.type_stack.len();
        let ty = self.expression(p);
        if self.match_tok(p, TokenKind::FatArrow) {
            self.decl_or_reassign_tail(p, ty);
            return;
        }
        if self.match_tok(p, TokenKind::Question) {
            self.conditional_tail(p, ty);
            return;
        }
        if self.match_tok(p, TokenKind::At) {
            self.while_tail(p, ty, loop_start);
            return;
        }
        if self.type_stack.len() > before {
            self.type_stack.pop();
            self.chunk.emit_op(OpCode::Pop, p.previous.line);
        }
    }

    fn expression(&mut self, p: &mut Parser) -> TypeDesc {
        self.parse_precedence(p, Precedence::Assign)
    }

    fn parse_precedence(&mut self, p: &mut Parser, prec: Precedence) -> TypeDesc {
        self.advance(p);
        let prefix_kind = p.previous.kind;
        let rule = get_rule(prefix_kind);
        let Some(prefix) = rule.prefix else {
            self.error_at_previous(p, "Expect expression.");
            return TypeDesc::Any;
        };
        let mut ty = prefix(self, p);

        while prec <= get_rule(p.current.kind).precedence {
            self.advance(p);
            let infix_kind = p.previous.kind;
            let Some(infix) = get_rule(infix_kind).infix else {
                break;
            };
            ty = infix(self, p, ty);
        }
        ty
    }

    /// `=> name [: type] <init>` or `=> obj.field <value>` / `=> arr.(i) <value>`.
    fn mutate_statement(&mut self, p: &mut Parser) {
        let arrow_line = p.current.line;
        self.advance(p); // '=>'
        let target_tok = p.current.clone();
        self.consume(p, TokenKind::Ident, "Expect variable name after '=>'.");
        let Some(idx) = self.resolve_local_by_name(&target_tok.lexeme) else {
            self.error_at(p, &target_tok, "Undefined identifier.");
            return;
        };
        let target_ty = self.locals[idx].ty.clone();
        let struct_name = self.locals[idx].struct_name.clone();

        self.consume(p, TokenKind::Dot, "Expect '.' after mutate target.");

        if self.match_tok(p, TokenKind::LParen) {
            let elem_ty = match &target_ty {
                TypeDesc::Array(elem) => (**elem).clone(),
                TypeDesc::Map(_, v) => (**v).clone(),
                _ => {
                    self.error_at(p, &target_tok, "Indexed mutation requires an array or map.");
                    TypeDesc::Any
                }
            };
            self.chunk.emit_op(OpCode::Load, arrow_line);
            self.chunk.emit_byte(idx as u8, arrow_line);
            let index_ty = self.expression(p);
            self.type_stack.pop();
            if !matches!(target_ty, TypeDesc::Map(_, _)) && !matches!(index_ty, TypeDesc::Int) {
                self.error_at(p, &target_tok, "Array index must be an int.");
            }
            self.consume(p, TokenKind::RParen, "Expect ')' after index.");
            let value_ty = self.expression(p);
            self.type_stack.pop();
            if !is_assignable(&elem_ty, &value_ty) {
                self.error_at(p, &target_tok, "Mutated value type mismatch.");
            }
            self.chunk.emit_op(OpCode::SetIndex, arrow_line);
        } else {
            let field_tok = p.current.clone();
            self.consume(p, TokenKind::Ident, "Expect field name.");
            let (field_idx, field_ty) = self.field_lookup(struct_name.as_deref(), &field_tok.lexeme).unwrap_or_else(|| {
                self.error_at(p, &field_tok, "Unknown struct field.");
                (0, TypeDesc::Any)
            });
            self.chunk.emit_op(OpCode::Load, arrow_line);
            self.chunk.emit_byte(idx as u8, arrow_line);
            let value_ty = self.expression(p);
            self.type_stack.pop();
            if !is_assignable(&field_ty, &value_ty) {
                self.error_at(p, &field_tok, "Mutated field type mismatch.");
            }
            self.chunk.emit_op(OpCode::SetMember, arrow_line);
            self.chunk.emit_byte(field_idx as u8, arrow_line);
        }
    }

    fn decl_or_reassign_tail(&mut self, p: &mut Parser, value_ty: TypeDesc) {
        let value_struct_name = self.last_simple_struct.take();
        let name_tok = p.current.clone();
        self.consume(p, TokenKind::Ident, "Expect name after '=>'.");
        let (final_ty, struct_name) = if self.match_tok(p, TokenKind::Colon) {
            let (t, sn) = self.parse_type_full(p);
            (t, sn.or_else(|| value_struct_name.clone()))
        } else {
            (value_ty.clone(), value_struct_name.clone())
        };
        if !is_assignable(&final_ty, &value_ty) {
            self.error_at(
                p,
                &name_tok,
                &format!("Cannot assign value of type '{value_ty}' to '{}' of type '{final_ty}'.", name_tok.lexeme),
            );
        }
        if let Some(idx) = self.resolve_local_by_name(&name_tok.lexeme) {
            self.locals[idx].ty = final_ty;
            self.locals[idx].struct_name = struct_name;
            self.locals[idx].guarded_depth = -1;
            self.chunk.emit_op(OpCode::Store, name_tok.line);
            self.chunk.emit_byte(idx as u8, name_tok.line);
        } else if self.locals.len() >= self.config.max_locals {
            self.error_at(p, &name_tok, "Too many locals.");
        } else {
            let idx = self.locals.len();
            self.locals.push(Local {
                name: name_tok.lexeme.clone(),
                ty: final_ty,
                depth: self.scope_depth,
                guarded_depth: -1,
                guarded_variant: 0,
                struct_name,
            });
            self.chunk.emit_op(OpCode::Store, name_tok.line);
            self.chunk.emit_byte(idx as u8, name_tok.line);
        }
        self.type_stack.pop();
    }

    fn conditional_tail(&mut self, p: &mut Parser, cond_ty: TypeDesc) {
        let line = p.previous.line;
        self.type_stack.pop();
        if !matches!(cond_ty, TypeDesc::Bool) {
            self.chunk.emit_op(OpCode::IsTruthy, line);
        }

        let narrowed = self.last_simple_local.take().filter(|_| cond_ty.is_option());
        let saved = narrowed.map(|idx| {
            let prev = (self.locals[idx].guarded_depth, self.locals[idx].guarded_variant);
            self.locals[idx].guarded_depth = self.scope_depth + 1;
            self.locals[idx].guarded_variant = 1; // `some`
            (idx, prev)
        });

        self.chunk.emit_op(OpCode::JumpIfF, line);
        let else_jump = self.chunk.emit_i32_placeholder(line);

        let then_ty = self.branch(p);

        if let Some((idx, (d, v))) = saved {
            self.locals[idx].guarded_depth = d;
            self.locals[idx].guarded_variant = v;
        }

        self.chunk.emit_op(OpCode::Jump, line);
        let end_jump = self.chunk.emit_i32_placeholder(line);
        let else_at = self.chunk.here() as i32;
        self.chunk.patch_i32(else_jump, else_at);

        let else_ty = if self.match_tok(p, TokenKind::Colon) { self.branch(p) } else { None };

        let end_at = self.chunk.here() as i32;
        self.chunk.patch_i32(end_jump, end_at);

        if let (Some(t), Some(e)) = (then_ty, else_ty) {
            if t == e {
                self.type_push(t);
            }
        }
    }

    fn while_tail(&mut self, p: &mut Parser, cond_ty: TypeDesc, loop_start: usize) {
        let line = p.previous.line;
        self.type_stack.pop();
        if !matches!(cond_ty, TypeDesc::Bool) {
            self.chunk.emit_op(OpCode::IsTruthy, line);
        }
        self.chunk.emit_op(OpCode::JumpIfF, line);
        let exit_jump = self.chunk.emit_i32_placeholder(line);

        self.loops.push(LoopCtx { continue_target: loop_start, break_jumps: Vec::new() });
        self.branch(p);
        let loop_ctx = self.loops.pop().expect("loop context pushed above");

        self.chunk.emit_op(OpCode::Jump, line);
        let back = self.chunk.emit_i32_placeholder(line);
        self.chunk.patch_i32(back, loop_start as i32);

        let after = self.chunk.here() as i32;
        self.chunk.patch_i32(exit_jump, after);
        for j in loop_ctx.break_jumps {
            self.chunk.patch_i32(j, after);
        }
    }

    fn break_statement(&mut self, p: &mut Parser) {
        let line = p.current.line;
        self.advance(p); // '.'
        if self.loops.is_empty() {
            self.error_at_previous(p, "'.' (break) used outside a loop.");
            return;
        }
        self.chunk.emit_op(OpCode::Jump, line);
        let at = self.chunk.emit_i32_placeholder(line);
        self.loops.last_mut().unwrap().break_jumps.push(at);
    }

    fn continue_statement(&mut self, p: &mut Parser) {
        let line = p.current.line;
        self.advance(p); // '..'
        let Some(target) = self.loops.last().map(|l| l.continue_target) else {
            self.error_at_previous(p, "'..' (continue) used outside a loop.");
            return;
        };
        self.chunk.emit_op(OpCode::Jump, line);
        self.chunk.emit_i32(target as i32, line);
    }

    fn return_statement(&mut self, p: &mut Parser) {
        let line = p.current.line;
        self.advance(p); // '^'
        let expected = self.current_return_type.clone().unwrap_or(TypeDesc::Void);
        if self.check(p, TokenKind::Semicolon) || self.check(p, TokenKind::RBracket) {
            if !matches!(expected, TypeDesc::Void) {
                self.error_at_previous(p, "Non-void function must return a value.");
            }
        } else {
            let ty = self.expression(p);
            self.type_stack.pop();
            if !is_assignable(&expected, &ty) {
                self.error_at_previous(p, &format!("Return type '{ty}' does not match declared '{expected}'."));
            }
        }
        self.chunk.emit_op(OpCode::Ret, line);
    }

    fn throw_statement(&mut self, p: &mut Parser) {
        let line = p.current.line;
        self.advance(p); // 'throw'
        self.expression(p);
        self.type_stack.pop();
        self.chunk.emit_op(OpCode::Throw, line);
    }

    fn try_statement(&mut self, p: &mut Parser) {
        let line = p.current.line;
        self.advance(p); // 'try'
        self.chunk.emit_op(OpCode::Try, line);
        let handler_patch = self.chunk.emit_i32_placeholder(line);

        self.consume(p, TokenKind::LBracket, "Expect '[' to start try body.");
        self.block(p);
        self.chunk.emit_op(OpCode::EndTry, line);

        self.chunk.emit_op(OpCode::Jump, line);
        let skip_catch = self.chunk.emit_i32_placeholder(line);

        let handler_at = self.chunk.here() as i32;
        self.chunk.patch_i32(handler_patch, handler_at);

        self.consume(p, TokenKind::Catch, "Expect 'catch' after try body.");
        let err_tok = p.current.clone();
        self.consume(p, TokenKind::Ident, "Expect error binding name after 'catch'.");

        self.begin_scope();
        let err_idx = self.locals.len();
        self.locals.push(Local {
            name: err_tok.lexeme.clone(),
            ty: TypeDesc::Err,
            depth: self.scope_depth,
            guarded_depth: -1,
            guarded_variant: 0,
            struct_name: None,
        });
        self.chunk.emit_op(OpCode::Store, line);
        self.chunk.emit_byte(err_idx as u8, line);

        self.consume(p, TokenKind::LBracket, "Expect '[' to start catch body.");
        self.block(p);
        self.end_scope();

        let after = self.chunk.here() as i32;
        self.chunk.patch_i32(skip_catch, after);
    }

    fn match_statement(&mut self, p: &mut Parser) {
        let line = p.current.line;
        self.advance(p); // 'match'

        let scrutinee_ty = self.expression(p);
        let local_idx = self.last_simple_local.take();
        if matches!(scrutinee_ty, TypeDesc::Any) {
            self.match_any_arms(p, line);
            return;
        }
        let enum_id = match &scrutinee_ty {
            TypeDesc::Enum(id, _) => Some(*id),
            _ => None,
        };
        let Some(enum_id) = enum_id else {
            self.error_at_previous(p, "'match' requires an enum (or Option) scrutinee.");
            self.type_stack.pop();
            self.consume(p, TokenKind::LBracket, "Expect '[' to start match arms.");
            let mut depth = 1;
            while depth > 0 && !self.check(p, TokenKind::Eof) {
                if self.check(p, TokenKind::LBracket) {
                    depth += 1;
                } else if self.check(p, TokenKind::RBracket) {
                    depth -= 1;
                }
                self.advance(p);
            }
            return;
        };

        let variants: Vec<(String, Option<TypeDesc>)> = self
            .enums
            .iter()
            .find(|e| e.id == enum_id)
            .map(|e| e.variants.iter().map(|v| (v.name.clone(), v.payload.clone())).collect())
            .unwrap_or_default();

        self.consume(p, TokenKind::LBracket, "Expect '[' to start match arms.");
        let mut seen = Vec::new();
        let mut end_jumps = Vec::new();
        let mut next_check_patch: Option<usize> = None;

        while !self.check(p, TokenKind::RBracket) && !self.check(p, TokenKind::Eof) {
            if let Some(patch) = next_check_patch.take() {
                let here = self.chunk.here() as i32;
                self.chunk.patch_i32(patch, here);
            }
            let variant_tok = p.current.clone();
            self.consume(p, TokenKind::Ident, "Expect variant name in match arm.");
            let variant_idx = variants.iter().position(|(n, _)| *n == variant_tok.lexeme);
            let Some(variant_idx) = variant_idx else {
                self.error_at(p, &variant_tok, "Unknown variant in match arm.");
                self.consume(p, TokenKind::LBracket, "Expect '[' to start arm body.");
                self.block(p);
                continue;
            };
            seen.push(variant_tok.lexeme.clone());

            self.chunk.emit_op(OpCode::CheckVariant, variant_tok.line);
            self.chunk.emit_i32(variant_idx as i32, variant_tok.line);
            self.chunk.emit_op(OpCode::JumpIfF, variant_tok.line);
            next_check_patch = Some(self.chunk.emit_i32_placeholder(variant_tok.line));

            self.begin_scope();
            let saved_guard = local_idx.map(|idx| (self.locals[idx].guarded_depth, self.locals[idx].guarded_variant));
            if let Some(idx) = local_idx {
                self.locals[idx].guarded_depth = self.scope_depth;
                self.locals[idx].guarded_variant = variant_idx as u8;
            }

            if self.match_tok(p, TokenKind::LParen) {
                let bind_tok = p.current.clone();
                self.consume(p, TokenKind::Ident, "Expect binding name.");
                self.consume(p, TokenKind::RParen, "Expect ')' after binding name.");
                let payload_ty = variants[variant_idx].1.clone().unwrap_or(TypeDesc::Any);
                self.chunk.emit_op(OpCode::ExtractEnumPayload, bind_tok.line);
                let bind_idx = self.locals.len();
                self.locals.push(Local {
                    name: bind_tok.lexeme.clone(),
                    ty: payload_ty,
                    depth: self.scope_depth,
                    guarded_depth: -1,
                    guarded_variant: 0,
                    struct_name: None,
                });
                self.chunk.emit_op(OpCode::Store, bind_tok.line);
                self.chunk.emit_byte(bind_idx as u8, bind_tok.line);
            } else {
                // No binding: the scrutinee enum is still sitting on the
                // stack from CHECK_VARIANT's non-destructive peek.
                self.chunk.emit_op(OpCode::Pop, variant_tok.line);
            }

            self.consume(p, TokenKind::LBracket, "Expect '[' to start arm body.");
            self.block(p);
            self.end_scope();
            if let Some((d, v)) = saved_guard {
                if let Some(idx) = local_idx {
                    self.locals[idx].guarded_depth = d;
                    self.locals[idx].guarded_variant = v;
                }
            }

            self.chunk.emit_op(OpCode::Jump, variant_tok.line);
            end_jumps.push(self.chunk.emit_i32_placeholder(variant_tok.line));
        }
        self.consume(p, TokenKind::RBracket, "Expect ']' to close match.");

        if let Some(patch) = next_check_patch.take() {
            let here = self.chunk.here() as i32;
            self.chunk.patch_i32(patch, here);
        }
        // No arm matched: release the scrutinee every CHECK_VARIANT peeked.
        self.chunk.emit_op(OpCode::Pop, line);

        let after = self.chunk.here() as i32;
        for j in end_jumps {
            self.chunk.patch_i32(j, after);
        }

        let unique: HashSet<&String> = seen.iter().collect();
        if unique.len() != seen.len() || seen.len() != variants.len() {
            self.error_at_previous(p, "'match' arms must cover every variant exactly once.");
        }

        self.type_stack.pop();
    }

    /// `match` scrutinising an `any` value with explicit type arms (spec.md
    /// §4.3: "permits scrutinising any with explicit type arms"). Unlike the
    /// enum form, exhaustiveness is not enforced — the arm list is just a
    /// type-dispatch cascade over whatever kind the value happens to carry
    /// at runtime.
    fn match_any_arms(&mut self, p: &mut Parser, line: u32) {
        self.consume(p, TokenKind::LBracket, "Expect '[' to start match arms.");
        let mut end_jumps = Vec::new();
        let mut next_check_patch: Option<usize> = None;

        while !self.check(p, TokenKind::RBracket) && !self.check(p, TokenKind::Eof) {
            if let Some(patch) = next_check_patch.take() {
                let here = self.chunk.here() as i32;
                self.chunk.patch_i32(patch, here);
            }
            let arm_line = p.current.line;
            let (arm_ty, _) = self.parse_type_bare(p);
            let kind_byte = (arm_ty.to_packed() & 0xFF) as u8;

            self.chunk.emit_op(OpCode::CheckType, arm_line);
            self.chunk.emit_byte(kind_byte, arm_line);
            self.chunk.emit_op(OpCode::JumpIfF, arm_line);
            next_check_patch = Some(self.chunk.emit_i32_placeholder(arm_line));

            self.begin_scope();
            if self.match_tok(p, TokenKind::LParen) {
                let bind_tok = p.current.clone();
                self.consume(p, TokenKind::Ident, "Expect binding name.");
                self.consume(p, TokenKind::RParen, "Expect ')' after binding name.");
                self.chunk.emit_op(OpCode::AsType, bind_tok.line);
                self.chunk.emit_i32(arm_ty.to_packed() as i32, bind_tok.line);
                let bind_idx = self.locals.len();
                self.locals.push(Local {
                    name: bind_tok.lexeme.clone(),
                    ty: arm_ty.clone(),
                    depth: self.scope_depth,
                    guarded_depth: -1,
                    guarded_variant: 0,
                    struct_name: None,
                });
                self.chunk.emit_op(OpCode::Store, bind_tok.line);
                self.chunk.emit_byte(bind_idx as u8, bind_tok.line);
            } else {
                // No binding: the scrutinee is still sitting on the stack
                // from CHECK_TYPE's non-destructive peek.
                self.chunk.emit_op(OpCode::Pop, arm_line);
            }

            self.consume(p, TokenKind::LBracket, "Expect '[' to start arm body.");
            self.block(p);
            self.end_scope();

            self.chunk.emit_op(OpCode::Jump, arm_line);
            end_jumps.push(self.chunk.emit_i32_placeholder(arm_line));
        }
        self.consume(p, TokenKind::RBracket, "Expect ']' to close match.");

        if let Some(patch) = next_check_patch.take() {
            let here = self.chunk.here() as i32;
            self.chunk.patch_i32(patch, here);
        }
        // No arm matched: release the scrutinee every CHECK_TYPE peeked.
        self.chunk.emit_op(OpCode::Pop, line);

        let after = self.chunk.here() as i32;
        for j in end_jumps {
            self.chunk.patch_i32(j, after);
        }

        self.type_stack.pop();
    }
}

// ---- Pratt prefix/infix productions ----

fn number(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    if p.previous.kind == TokenKind::Flt {
        let v: f64 = p.previous.lexeme.parse().unwrap_or(0.0);
        c.chunk.emit_op(OpCode::PushFlt, line);
        c.chunk.emit_i64(v.to_bits() as i64, line);
        c.type_push(TypeDesc::Flt);
        TypeDesc::Flt
    } else {
        let v: i64 = p.previous.lexeme.parse().unwrap_or(0);
        c.chunk.emit_op(OpCode::PushInt, line);
        c.chunk.emit_i64(v, line);
        c.type_push(TypeDesc::Int);
        TypeDesc::Int
    }
}

fn string_lit(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    let idx = c.chunk.add_string(&p.previous.lexeme);
    c.chunk.emit_op(OpCode::PushStr, line);
    c.chunk.emit_byte(idx, line);
    c.type_push(TypeDesc::Str);
    TypeDesc::Str
}

fn bool_lit(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    let v = p.previous.kind == TokenKind::True;
    c.chunk.emit_op(OpCode::PushBool, line);
    c.chunk.emit_byte(v as u8, line);
    c.type_push(TypeDesc::Bool);
    TypeDesc::Bool
}

fn grouping(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    let ty = c.expression(p);
    c.consume(p, TokenKind::RParen, "Expect ')' after expression.");
    ty
}

fn unary(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let op = p.previous.kind;
    let line = p.previous.line;
    let operand_ty = c.parse_precedence(p, Precedence::Unary);
    c.type_pop(p, "");
    let result = match op {
        TokenKind::Minus => {
            if matches!(operand_ty, TypeDesc::Int | TypeDesc::Flt) {
                c.chunk.emit_op(OpCode::Neg, line);
                operand_ty
            } else {
                c.error_at_previous(p, "Unary '-' requires a numeric operand.");
                TypeDesc::Any
            }
        }
        TokenKind::Bang => {
            if !matches!(operand_ty, TypeDesc::Bool) {
                c.error_at_previous(p, "Unary '!' requires a boolean operand.");
            }
            c.chunk.emit_op(OpCode::Not, line);
            TypeDesc::Bool
        }
        _ => unreachable!("unary() called for non-unary token"),
    };
    c.type_push(result.clone());
    result
}

fn binary(c: &mut Compiler, p: &mut Parser, left_ty: TypeDesc) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let op = p.previous.kind;
    let line = p.previous.line;
    let rule_prec = get_rule(op).precedence;
    let right_ty = c.parse_precedence(p, rule_prec.next());

    c.type_pop(p, "");
    c.type_pop(p, "");

    let result = match op {
        TokenKind::Plus => {
            if matches!(left_ty, TypeDesc::Str) && matches!(right_ty, TypeDesc::Str) {
                c.chunk.emit_op(OpCode::Add, line);
                TypeDesc::Str
            } else if c.numeric_match(&left_ty, &right_ty) {
                c.chunk.emit_op(OpCode::Add, line);
                left_ty
            } else {
                c.error_at_previous(p, "Operands to '+' must both be numbers, or both strings.");
                TypeDesc::Any
            }
        }
        TokenKind::Minus | TokenKind::Star | TokenKind::Slash => {
            if c.numeric_match(&left_ty, &right_ty) {
                c.chunk.emit_op(
                    match op {
                        TokenKind::Minus => OpCode::Sub,
                        TokenKind::Star => OpCode::Mul,
                        _ => OpCode::Div,
                    },
                    line,
                );
                left_ty
            } else {
                c.error_at_previous(p, "Arithmetic operands must be the same numeric kind.");
                TypeDesc::Any
            }
        }
        TokenKind::Percent => {
            if matches!(left_ty, TypeDesc::Int) && matches!(right_ty, TypeDesc::Int) {
                c.chunk.emit_op(OpCode::Mod, line);
                TypeDesc::Int
            } else {
                c.error_at_previous(p, "'%' requires two ints.");
                TypeDesc::Any
            }
        }
        TokenKind::EqEq | TokenKind::NotEq => {
            if left_ty == right_ty || matches!(left_ty, TypeDesc::Any) || matches!(right_ty, TypeDesc::Any) {
                c.chunk.emit_op(OpCode::Eq, line);
                if op == TokenKind::NotEq {
                    c.chunk.emit_op(OpCode::Not, line);
                }
            } else {
                c.error_at_previous(p, "'==' / '!=' require matching types.");
            }
            TypeDesc::Bool
        }
        TokenKind::LAngle | TokenKind::RAngle | TokenKind::Lte | TokenKind::Gte => {
            if left_ty == right_ty && !matches!(left_ty, TypeDesc::Any) {
                c.chunk.emit_op(
                    match op {
                        TokenKind::LAngle => OpCode::Lt,
                        TokenKind::RAngle => OpCode::Gt,
                        TokenKind::Lte => OpCode::Lte,
                        _ => OpCode::Gte,
                    },
                    line,
                );
            } else {
                c.error_at_previous(p, "Comparison operands must have matching, non-'any' types.");
            }
            TypeDesc::Bool
        }
        _ => unreachable!("binary() called for non-binary token"),
    };
    c.type_push(result.clone());
    result
}

fn logical(c: &mut Compiler, p: &mut Parser, left_ty: TypeDesc) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let op = p.previous.kind;
    let line = p.previous.line;
    let rule_prec = get_rule(op).precedence;
    let right_ty = c.parse_precedence(p, rule_prec.next());
    c.type_pop(p, "");
    c.type_pop(p, "");
    if !matches!(left_ty, TypeDesc::Bool) || !matches!(right_ty, TypeDesc::Bool) {
        c.error_at_previous(p, "'&&' / '||' require boolean operands.");
    }
    c.chunk.emit_op(if op == TokenKind::AndAnd { OpCode::And } else { OpCode::Or }, line);
    c.type_push(TypeDesc::Bool);
    TypeDesc::Bool
}

fn print_op(c: &mut Compiler, p: &mut Parser, _left: TypeDesc) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    c.type_pop(p, "Nothing to print.");
    c.chunk.emit_op(OpCode::Print, line);
    TypeDesc::Void
}

fn dot(c: &mut Compiler, p: &mut Parser, left_ty: TypeDesc) -> TypeDesc {
    let local = c.last_simple_local.take();
    let struct_name = c.last_simple_struct.take();
    let line = p.previous.line;
    let field_tok = p.current.clone();

    if left_ty.is_option() {
        c.consume(p, TokenKind::Ident, "Expect 'some' or 'none' after option value.");
        return match field_tok.lexeme.as_str() {
            "some" => {
                let guarded = local.is_some_and(|idx| {
                    c.locals[idx].guarded_depth >= 0
                        && c.locals[idx].guarded_depth <= c.scope_depth
                        && c.locals[idx].guarded_variant == 1
                });
                if !guarded {
                    c.error_at(p, &field_tok, "unsafe unwrap: '.some' requires a guarding if/match on this value.");
                }
                c.type_pop(p, "Expect option value before '.some'.");
                c.chunk.emit_op(OpCode::GetEnumPayload, line);
                let inner = left_ty.option_inner().cloned().unwrap_or(TypeDesc::Any);
                c.type_push(inner.clone());
                inner
            }
            "none" => {
                c.type_pop(p, "Expect option value before '.none'.");
                c.chunk.emit_op(OpCode::CheckVariant, line);
                c.chunk.emit_i32(0, line);
                c.type_push(TypeDesc::Bool);
                TypeDesc::Bool
            }
            other => {
                c.error_at(p, &field_tok, &format!("Unknown option accessor '{other}'."));
                c.type_pop(p, "");
                c.type_push(TypeDesc::Any);
                TypeDesc::Any
            }
        };
    }

    if matches!(field_tok.kind, TokenKind::LParen) && matches!(left_ty, TypeDesc::Array(_) | TypeDesc::Map(_, _)) {
        c.advance(p); // '('
        let elem_ty = match &left_ty {
            TypeDesc::Array(elem) => (**elem).clone(),
            TypeDesc::Map(_, v) => (**v).clone(),
            _ => unreachable!("guarded above"),
        };
        let index_ty = c.expression(p);
        c.type_pop(p, "");
        if matches!(left_ty, TypeDesc::Array(_)) && !matches!(index_ty, TypeDesc::Int) {
            c.error_at_previous(p, "Array index must be an int.");
        }
        c.consume(p, TokenKind::RParen, "Expect ')' after index.");
        c.type_pop(p, "Expect array or map value before '.('.");
        c.chunk.emit_op(OpCode::Index, line);
        c.type_push(elem_ty.clone());
        return elem_ty;
    }

    c.consume(p, TokenKind::Ident, "Expect field name after '.'.");
    let (field_idx, field_ty) = c.field_lookup(struct_name.as_deref(), &field_tok.lexeme).unwrap_or_else(|| {
        c.error_at(p, &field_tok, "Unknown struct field.");
        (0, TypeDesc::Any)
    });
    c.type_pop(p, "Expect struct value before '.'.");
    c.chunk.emit_op(OpCode::GetMember, line);
    c.chunk.emit_byte(field_idx as u8, line);
    c.type_push(field_ty.clone());
    field_ty
}

fn recv(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    let ch_ty = c.parse_precedence(p, Precedence::Unary);
    let elem = match &ch_ty {
        TypeDesc::Chan(e) => (**e).clone(),
        _ => {
            c.error_at_previous(p, "Expect channel value after '<-'.");
            TypeDesc::Any
        }
    };
    c.type_pop(p, "Expect channel value.");
    c.chunk.emit_op(OpCode::Recv, line);
    c.type_push(elem.clone());
    elem
}

fn send(c: &mut Compiler, p: &mut Parser, left_ty: TypeDesc) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    let elem_expected = match &left_ty {
        TypeDesc::Chan(e) => (**e).clone(),
        _ => {
            c.error_at_previous(p, "Expect channel value before '<-'.");
            TypeDesc::Any
        }
    };
    let value_ty = c.parse_precedence(p, Precedence::Term.next());
    if !is_assignable(&elem_expected, &value_ty) {
        c.error_at_previous(p, "Sent value type does not match channel element type.");
    }
    c.type_pop(p, "");
    c.type_pop(p, "");
    c.chunk.emit_op(OpCode::Send, line);
    TypeDesc::Void
}

fn some_expr(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    c.consume(p, TokenKind::LParen, "Expect '(' after 'some'.");
    let inner_ty = c.expression(p);
    c.consume(p, TokenKind::RParen, "Expect ')' after 'some' payload.");
    c.type_pop(p, "");
    let ty = TypeDesc::option_of(inner_ty);
    c.chunk.emit_op(OpCode::EnumVariant, line);
    c.chunk.emit_i32(ty.to_packed() as i32, line);
    c.chunk.emit_byte(opo_core::limits::OPTION_ENUM_ID, line);
    c.chunk.emit_byte(1, line);
    c.type_push(ty.clone());
    ty
}

fn none_expr(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    let ty = TypeDesc::option_of(TypeDesc::Any);
    c.chunk.emit_op(OpCode::EnumVariant, line);
    c.chunk.emit_i32(ty.to_packed() as i32, line);
    c.chunk.emit_byte(opo_core::limits::OPTION_ENUM_ID, line);
    c.chunk.emit_byte(0, line);
    c.type_push(ty.clone());
    ty
}

fn chan_ctor(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    c.consume(p, TokenKind::LAngle, "Expect '<' after 'chan'.");
    let elem = c.parse_type(p);
    c.consume(p, TokenKind::RAngle, "Expect '>' after channel element type.");
    c.consume(p, TokenKind::LParen, "Expect '(' for channel capacity.");
    let cap_ty = c.expression(p);
    c.consume(p, TokenKind::RParen, "Expect ')' after channel capacity.");
    if !matches!(cap_ty, TypeDesc::Int) {
        c.error_at_previous(p, "Channel capacity must be an int.");
    }
    c.type_pop(p, "");
    let ty = TypeDesc::Chan(Box::new(elem));
    c.chunk.emit_op(OpCode::Chan, line);
    c.chunk.emit_i32(ty.to_packed() as i32, line);
    c.type_push(ty.clone());
    ty
}

fn go_expr(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    let name_tok = p.current.clone();
    c.consume(p, TokenKind::Ident, "Expect a function call after 'go'.");
    let Some(f) = c.functions.iter().find(|f| f.name == name_tok.lexeme).cloned() else {
        c.error_at(p, &name_tok, "Undefined function in 'go' statement.");
        return TypeDesc::Void;
    };
    c.consume(p, TokenKind::LParen, "Expect '(' after function name.");

    // Args are pushed before the callable, matching INVOKE's own
    // pop-callable-then-pop-args convention (compiler.c's `variable()`
    // emits OP_LOAD for the callee only after parsing its arguments).
    let mut count = 0usize;
    if !c.check(p, TokenKind::RParen) {
        loop {
            let arg_ty = c.expression(p);
            if let Some(expected) = f.param_types.get(count) {
                if !is_assignable(expected, &arg_ty) {
                    c.error_at_previous(p, "Argument type mismatch in 'go' call.");
                }
            } else {
                c.error_at_previous(p, "Too many arguments.");
            }
            c.type_pop(p, "");
            count += 1;
            if !c.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(p, TokenKind::RParen, "Expect ')' after arguments.");
    if count != f.param_types.len() {
        c.error_at(p, &name_tok, &format!("'{}' expects {} arguments, got {count}.", f.name, f.param_types.len()));
    }
    c.chunk.emit_op(OpCode::PushFunc, line);
    c.chunk.emit_i64(f.address, line);
    c.chunk.emit_byte(Compiler::func_kind_byte(&f.return_type), line);
    c.chunk.emit_op(OpCode::Go, line);
    c.chunk.emit_byte(count as u8, line);
    TypeDesc::Void
}

fn array_literal(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    let mut elem_ty: Option<TypeDesc> = None;
    let mut count = 0usize;
    if !c.check(p, TokenKind::RBracket) {
        loop {
            let ty = c.expression(p);
            c.type_pop(p, "");
            match &elem_ty {
                None => elem_ty = Some(ty),
                Some(prev) if !is_assignable(prev, &ty) => {
                    c.error_at_previous(p, "Array elements must share a common type.");
                }
                _ => {}
            }
            count += 1;
            if !c.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(p, TokenKind::RBracket, "Expect ']' to close array literal.");
    let elem = elem_ty.unwrap_or(TypeDesc::Any);
    let ty = TypeDesc::Array(Box::new(elem));
    c.chunk.emit_op(OpCode::Array, line);
    c.chunk.emit_i32(ty.to_packed() as i32, line);
    c.chunk.emit_byte(count as u8, line);
    c.type_push(ty.clone());
    ty
}

fn map_literal(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    c.last_simple_local = None;
    c.last_simple_struct = None;
    let line = p.previous.line;
    let mut key_ty: Option<TypeDesc> = None;
    let mut val_ty: Option<TypeDesc> = None;
    let mut count = 0usize;
    if !c.check(p, TokenKind::RBrace) {
        loop {
            let k = c.expression(p);
            c.type_pop(p, "");
            c.consume(p, TokenKind::Colon, "Expect ':' between map key and value.");
            let v = c.expression(p);
            c.type_pop(p, "");
            if key_ty.is_none() {
                key_ty = Some(k);
            }
            if val_ty.is_none() {
                val_ty = Some(v);
            }
            count += 1;
            if !c.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(p, TokenKind::RBrace, "Expect '}' to close map literal.");
    let ty = TypeDesc::Map(Box::new(key_ty.unwrap_or(TypeDesc::Any)), Box::new(val_ty.unwrap_or(TypeDesc::Any)));
    c.chunk.emit_op(OpCode::Map, line);
    c.chunk.emit_i32(ty.to_packed() as i32, line);
    c.chunk.emit_byte(count as u8, line);
    c.type_push(ty.clone());
    ty
}

fn variable(c: &mut Compiler, p: &mut Parser) -> TypeDesc {
    let name_tok = p.previous.clone();
    let name = name_tok.lexeme.clone();

    if let Some(idx) = c.resolve_local_by_name(&name) {
        let ty = c.locals[idx].ty.clone();
        let struct_name = c.locals[idx].struct_name.clone();
        if matches!(ty, TypeDesc::Func(_)) && c.check(p, TokenKind::LParen) {
            c.last_simple_local = None;
            c.last_simple_struct = None;
            return dynamic_invoke(c, p, idx, &ty, &name_tok);
        }
        c.chunk.emit_op(OpCode::Load, name_tok.line);
        c.chunk.emit_byte(idx as u8, name_tok.line);
        c.last_simple_local = Some(idx);
        c.last_simple_struct = struct_name;
        c.type_push(ty.clone());
        return ty;
    }
    c.last_simple_local = None;
    c.last_simple_struct = None;

    if c.aliases.contains(&name) && c.check(p, TokenKind::Dot) {
        c.advance(p); // '.'
        let member_tok = p.current.clone();
        c.consume(p, TokenKind::Ident, "Expect name after import alias.");
        let full = format!("{name}.{}", member_tok.lexeme);
        return resolve_named(c, p, &full, &member_tok);
    }

    if name == "typeof" {
        c.consume(p, TokenKind::LParen, "Expect '(' after 'typeof'.");
        c.expression(p);
        c.consume(p, TokenKind::RParen, "Expect ')' to close 'typeof'.");
        c.type_pop(p, "");
        c.chunk.emit_op(OpCode::Typeof, name_tok.line);
        c.type_push(TypeDesc::Str);
        return TypeDesc::Str;
    }

    if let Some(sig) = c.natives.iter().find(|n| n.name == name).cloned() {
        return native_call(c, p, &sig, &name_tok);
    }

    resolve_named(c, p, &name, &name_tok)
}

fn resolve_named(c: &mut Compiler, p: &mut Parser, name: &str, name_tok: &Token) -> TypeDesc {
    if c.structs.iter().any(|s| s.name == name) {
        return struct_construct(c, p, name, name_tok);
    }
    if let Some(f) = c.functions.iter().find(|f| f.name == name).cloned() {
        if c.check(p, TokenKind::LParen) {
            return function_call(c, p, &f, name_tok);
        }
        c.chunk.emit_op(OpCode::PushFunc, name_tok.line);
        c.chunk.emit_i64(f.address, name_tok.line);
        c.chunk.emit_byte(Compiler::func_kind_byte(&f.return_type), name_tok.line);
        let ty = TypeDesc::Func(Some(Box::new(f.return_type.clone())));
        c.type_push(ty.clone());
        return ty;
    }
    c.error_at(p, name_tok, "Undefined identifier.");
    TypeDesc::Any
}

fn struct_construct(c: &mut Compiler, p: &mut Parser, name: &str, name_tok: &Token) -> TypeDesc {
    c.consume(p, TokenKind::LParen, "Expect '(' after struct name for instantiation.");
    let sd = c.structs.iter().find(|s| s.name == name).cloned().expect("checked by caller");
    let mut count = 0usize;
    if !c.check(p, TokenKind::RParen) {
        loop {
            let arg_ty = c.expression(p);
            if let Some(expected) = sd.field_types.get(count) {
                if !is_assignable(expected, &arg_ty) {
                    c.error_at_previous(
                        p,
                        &format!("Argument {} to '{name}' has type '{arg_ty}', expected '{expected}'.", count + 1),
                    );
                }
            } else {
                c.error_at_previous(p, "Too many arguments to struct constructor.");
            }
            c.type_pop(p, "");
            count += 1;
            if !c.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(p, TokenKind::RParen, "Expect ')' after struct arguments.");
    if count != sd.fields.len() {
        c.error_at(p, name_tok, &format!("'{name}' expects {} fields, got {count}.", sd.fields.len()));
    }
    c.chunk.emit_op(OpCode::Struct, name_tok.line);
    c.chunk.emit_byte(sd.fields.len() as u8, name_tok.line);
    let ty = TypeDesc::Array(Box::new(TypeDesc::Any));
    c.last_simple_struct = Some(name.to_string());
    c.type_push(ty.clone());
    ty
}

fn function_call(c: &mut Compiler, p: &mut Parser, f: &FunctionDef, name_tok: &Token) -> TypeDesc {
    c.consume(p, TokenKind::LParen, "Expect '(' after function name.");
    let mut count = 0usize;
    if !c.check(p, TokenKind::RParen) {
        loop {
            let arg_ty = c.expression(p);
            if let Some(expected) = f.param_types.get(count) {
                if !is_assignable(expected, &arg_ty) {
                    c.error_at_previous(
                        p,
                        &format!(
                            "Argument {} to '{}' has type '{arg_ty}', expected '{expected}'.",
                            count + 1,
                            f.name
                        ),
                    );
                }
            } else {
                c.error_at_previous(p, "Too many arguments.");
            }
            c.type_pop(p, "");
            count += 1;
            if !c.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(p, TokenKind::RParen, "Expect ')' after arguments.");
    if count != f.param_types.len() {
        c.error_at(p, name_tok, &format!("'{}' expects {} arguments, got {count}.", f.name, f.param_types.len()));
    }
    c.chunk.emit_op(OpCode::Call, name_tok.line);
    c.chunk.emit_i32(f.address as i32, name_tok.line);
    c.type_push(f.return_type.clone());
    f.return_type.clone()
}

fn native_call(c: &mut Compiler, p: &mut Parser, sig: &NativeSig, name_tok: &Token) -> TypeDesc {
    c.consume(p, TokenKind::LParen, "Expect '(' after native name.");
    let mut count = 0usize;
    if !c.check(p, TokenKind::RParen) {
        loop {
            let arg_ty = c.expression(p);
            if !sig.variadic {
                if let Some(expected) = sig.param_types.get(count) {
                    if !is_assignable(expected, &arg_ty) {
                        c.error_at_previous(
                            p,
                            &format!(
                                "Argument {} to '{}' has type '{arg_ty}', expected '{expected}'.",
                                count + 1,
                                sig.name
                            ),
                        );
                    }
                } else {
                    c.error_at_previous(p, "Too many arguments.");
                }
            }
            c.type_pop(p, "");
            count += 1;
            if !c.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(p, TokenKind::RParen, "Expect ')' after arguments.");
    if !sig.variadic && count != sig.param_types.len() {
        c.error_at(p, name_tok, &format!("'{}' expects {} arguments, got {count}.", sig.name, sig.param_types.len()));
    }
    c.chunk.emit_op(OpCode::LoadG, name_tok.line);
    c.chunk.emit_byte(sig.index, name_tok.line);
    c.chunk.emit_op(OpCode::Invoke, name_tok.line);
    c.chunk.emit_byte(count as u8, name_tok.line);
    c.type_push(sig.return_type.clone());
    sig.return_type.clone()
}

fn dynamic_invoke(c: &mut Compiler, p: &mut Parser, idx: usize, callee_ty: &TypeDesc, name_tok: &Token) -> TypeDesc {
    c.consume(p, TokenKind::LParen, "Expect '(' to call function value.");
    let mut count = 0usize;
    if !c.check(p, TokenKind::RParen) {
        loop {
            c.expression(p);
            c.type_pop(p, "");
            count += 1;
            if !c.match_tok(p, TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(p, TokenKind::RParen, "Expect ')' after arguments.");
    // Callable is loaded and pushed only after its arguments, matching
    // OP_INVOKE's own pop-callable-then-pop-args convention.
    c.chunk.emit_op(OpCode::Load, name_tok.line);
    c.chunk.emit_byte(idx as u8, name_tok.line);
    c.chunk.emit_op(OpCode::Invoke, name_tok.line);
    c.chunk.emit_byte(count as u8, name_tok.line);
    let ret = match callee_ty {
        TypeDesc::Func(Some(r)) => (**r).clone(),
        _ => TypeDesc::Any,
    };
    c.type_push(ret.clone());
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn compile_ok(src: &str) -> Chunk {
        let compiler = Compiler::new(CompilerConfig::default());
        compiler.compile(src, "<test>").expect("expected successful compile")
    }

    fn compile_err(src: &str) {
        let compiler = Compiler::new(CompilerConfig::default());
        assert!(compiler.compile(src, "<test>").is_err());
    }

    #[test]
    fn arithmetic_and_print_compiles() {
        let chunk = compile_ok("<> -> void: main [ (1 + 2 * 3)!! ]");
        assert!(chunk.code.contains(&(OpCode::Mul as u8)));
        assert!(chunk.code.contains(&(OpCode::Print as u8)));
    }

    #[test]
    fn missing_main_is_an_error() {
        compile_err("<> -> void: notmain [ 1!! ]");
    }

    #[test]
    fn conditional_with_local_decl_compiles() {
        let chunk = compile_ok(
            "<> -> void: main [ 5 => x : int; (x > 3) ? (\"big\"!!) : (\"small\"!!) ]",
        );
        assert!(chunk.code.contains(&(OpCode::JumpIfF as u8)));
    }

    #[test]
    fn while_loop_with_break_compiles() {
        compile_ok("<> -> void: main [ 0 => i : int; (i < 10) @ [ (i == 5) ? (.); i!!; i + 1 => i ] ]");
    }

    #[test]
    fn option_narrowing_requires_guard() {
        compile_ok(
            "<> -> int: f [ ^ 42 ]; <> -> void: main [ some(f()) => o : int?; o ? (o.some!!) : (\"none\"!!) ]",
        );
    }

    #[test]
    fn unguarded_some_access_is_an_error() {
        compile_err("<> -> void: main [ some(1) => o : int?; o.some!! ]");
    }

    #[test]
    fn struct_construction_and_mutation_compiles() {
        let chunk = compile_ok(
            "struct[x:int,y:int] => P : type; <> -> void: main [ P(3,4) => p : P; =>p.x 10; p.x!! ]",
        );
        assert!(chunk.code.contains(&(OpCode::SetMember as u8)));
        assert!(chunk.code.contains(&(OpCode::GetMember as u8)));
    }

    #[test]
    fn channel_construction_and_go_compiles() {
        let chunk = compile_ok(
            "<ch: chan<int>> -> void: prod [ ch <- 7 ]; <> -> void: main [ chan<int>(1) => c : chan<int>; go prod(c); (<-c)!! ]",
        );
        assert!(chunk.code.contains(&(OpCode::Go as u8)));
        assert!(chunk.code.contains(&(OpCode::Recv as u8)));
    }

    #[test]
    fn match_on_any_dispatches_by_type() {
        let chunk = compile_ok(
            "<> -> void: main [ 5 => x : any; match x [ int (n) [ n!! ] str (s) [ s!! ] ] ]",
        );
        assert!(chunk.code.contains(&(OpCode::CheckType as u8)));
        assert!(chunk.code.contains(&(OpCode::AsType as u8)));
    }

    #[test]
    fn try_catch_compiles() {
        let chunk = compile_ok(
            "<> -> void: main [ try [ 1 / 0 !! ] catch e [ (\"caught: \" + str(e))!! ] ]",
        );
        assert!(chunk.code.contains(&(OpCode::Try as u8)));
        assert!(chunk.code.contains(&(OpCode::EndTry as u8)));
    }

    #[test]
    fn import_inlines_prefixed_function() {
        let dir = tempfile::tempdir().unwrap();
        let lib_path = dir.path().join("mathlib.opo");
        std::fs::File::create(&lib_path).unwrap().write_all(b"<> -> int: two [ ^ 2 ]").unwrap();

        let main_src = format!(
            "\"{}\" => m : imp; <> -> void: main [ m.two()!! ]",
            lib_path.display()
        );
        let config = CompilerConfig::new(dir.path(), dir.path());
        let compiler = Compiler::new(config);
        let chunk = compiler.compile(&main_src, "main.opo").expect("import should compile");
        assert!(chunk.code.contains(&(OpCode::Call as u8)));
    }

    #[test]
    fn cyclic_import_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.opo");
        let b_path = dir.path().join("b.opo");
        std::fs::write(&a_path, format!("\"{}\" => b : imp; <> -> void: fa [ ]", b_path.display())).unwrap();
        std::fs::write(&b_path, format!("\"{}\" => a : imp; <> -> void: fb [ ]", a_path.display())).unwrap();

        let main_src = format!("\"{}\" => a : imp; <> -> void: main [ ]", a_path.display());
        let config = CompilerConfig::new(dir.path(), dir.path());
        let compiler = Compiler::new(config);
        assert!(compiler.compile(&main_src, "main.opo").is_err());
    }
}
