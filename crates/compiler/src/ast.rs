//! Abstract Syntax Tree for Opal
//!
//! Node kinds form a closed variant set; the analyzer and the code
//! generator dispatch over them exhaustively. Tokens are kept in the tree so
//! every later stage can report the origin of what it is looking at.

use crate::token::Token;

/// A whole compilation unit: structs first, then functions, each in source
/// order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub struct_defs: Vec<StructDef>,
    pub fun_defs: Vec<FunDef>,
}

/// A struct definition. Field order matters: positional construction with
/// `new T(...)` assigns arguments to fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub struct_name: Token,
    pub fields: Vec<VarDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunDef {
    pub return_type: DataType,
    pub fun_name: Token,
    pub params: Vec<VarDef>,
    pub stmts: Vec<Stmt>,
}

impl FunDef {
    /// The function's identity across analysis, code generation, and VM
    /// lookup: the name followed by `_<type>` per parameter, each tag
    /// suffixed with `array` for array parameters. A zero-parameter
    /// function's id is just its name.
    pub fn mangled_id(&self) -> String {
        let mut id = self.fun_name.lexeme.clone();
        for param in &self.params {
            id.push('_');
            id.push_str(&param.data_type.type_name.lexeme);
            if param.data_type.is_array {
                id.push_str("array");
            }
        }
        id
    }
}

/// Mangle a call site from the argument types the analyzer inferred.
pub fn mangle_call(fun_name: &str, arg_types: &[DataType]) -> String {
    let mut id = fun_name.to_string();
    for arg_type in arg_types {
        id.push('_');
        id.push_str(&arg_type.type_name.lexeme);
        if arg_type.is_array {
            id.push_str("array");
        }
    }
    id
}

/// A type annotation: a type-name token (base type, `void`, or struct name)
/// plus an is-array flag.
#[derive(Debug, Clone, PartialEq)]
pub struct DataType {
    pub is_array: bool,
    pub type_name: Token,
}

impl DataType {
    pub fn new(is_array: bool, type_name: Token) -> Self {
        DataType {
            is_array,
            type_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.type_name.lexeme
    }

    /// `void` is both the declared type of value-less functions and the
    /// inferred type of the `null` literal.
    pub fn is_void(&self) -> bool {
        self.type_name.lexeme == "void"
    }
}

/// A typed name: struct field, function parameter, or declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub data_type: DataType,
    pub var_name: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl(VarDecl),
    Assign(AssignStmt),
    While(WhileStmt),
    For(ForStmt),
    If(IfStmt),
    Return(ReturnStmt),
    /// A call expression in statement position.
    Call(CallExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub var_def: VarDef,
    pub expr: Option<Expr>,
}

/// An assignment through a non-empty lvalue path: `a = ...`,
/// `a[i].b.c[j] = ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    pub lvalue: Vec<VarRef>,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expr,
    pub stmts: Vec<Stmt>,
}

/// `for (<var_decl>; <condition>; <assign>) { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub var_decl: VarDecl,
    pub condition: Expr,
    pub assign_stmt: AssignStmt,
    pub stmts: Vec<Stmt>,
}

/// The primary `if`, its ordered `elseif` list, and the terminal `else`
/// body (empty when absent).
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub if_part: BasicIf,
    pub else_ifs: Vec<BasicIf>,
    pub else_stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicIf {
    pub condition: Expr,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub expr: Expr,
}

/// An expression. Binary operators are right-associative as written: each
/// `rest` nests under the previous `op`, and nothing downstream
/// re-associates. Parentheses (`ComplexTerm`) are the only grouping tool.
/// A set `not_op` applies after the whole operator chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub not_op: bool,
    pub first: ExprTerm,
    pub op: Option<Token>,
    pub rest: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprTerm {
    /// A bare rvalue.
    Simple(RValue),
    /// A parenthesized sub-expression; forces grouping.
    Complex(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RValue {
    /// A literal token: int, double, string, bool, or null.
    Simple(Token),
    New(NewRValue),
    Call(CallExpr),
    Var(VarRValue),
}

/// `new T[size]` or `new T(args...)`: exactly one of the two forms, by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRValue {
    pub type_name: Token,
    pub allocation: NewAllocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewAllocation {
    /// `new T[expr]`
    Array(Box<Expr>),
    /// `new T(expr, ...)`, positional struct construction.
    Struct(Vec<Expr>),
}

/// A function call. `fun_id` is empty until the analyzer resolves the call
/// to a mangled id.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub fun_name: Token,
    pub args: Vec<Expr>,
    pub fun_id: Option<String>,
}

/// A variable use through a non-empty path: `x`, `p.y`, `rows[i].cells[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRValue {
    pub path: Vec<VarRef>,
}

/// One path segment: a name plus an optional array index expression.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub var_name: Token,
    pub array_expr: Option<Box<Expr>>,
}
