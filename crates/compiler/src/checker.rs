//! Semantic analyzer for Opal
//!
//! Two passes in one visit. The global pass registers struct and function
//! tables, rejecting duplicate names, collisions with built-in ids, and a
//! malformed or missing `main`. The body pass walks every definition with a
//! scoped symbol table, inferring and checking types, and resolves each call
//! site to a mangled function id that it writes back onto the `CallExpr`
//! node for the code generator.
//!
//! `null` has type `void` throughout: it unifies with any type on
//! assignment, argument passing into struct construction, returns, and
//! equality.

use crate::ast::{
    AssignStmt, CallExpr, DataType, Expr, ExprTerm, ForStmt, FunDef, IfStmt, NewAllocation,
    NewRValue, Program, RValue, ReturnStmt, Stmt, StructDef, VarDecl, VarDef, VarRef, WhileStmt,
    mangle_call,
};
use crate::builtins::{
    BASE_LENGTH_IDS, BASE_TYPES, BUILT_INS, builtin_result_type, struct_length_id,
};
use crate::error::StaticError;
use crate::symbol_table::SymbolTable;
use crate::token::{Token, TokenType};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub struct SemanticChecker {
    /// struct name -> definition (cloned out of the program in the global
    /// pass; field order matters for positional construction).
    structs: HashMap<String, StructDef>,
    /// mangled function id -> declared return type.
    functions: HashMap<String, DataType>,
    /// Reserved `length_*` ids: the base family plus one per struct.
    length_ids: HashSet<String>,
    symbol_table: SymbolTable,
}

/// Analyze a program, writing resolved function ids onto its call nodes.
pub fn check_program(program: &mut Program) -> Result<(), StaticError> {
    SemanticChecker::new().check(program)
}

impl SemanticChecker {
    pub fn new() -> Self {
        SemanticChecker {
            structs: HashMap::new(),
            functions: HashMap::new(),
            length_ids: BASE_LENGTH_IDS.iter().map(|s| s.to_string()).collect(),
            symbol_table: SymbolTable::new(),
        }
    }

    pub fn check(mut self, program: &mut Program) -> Result<(), StaticError> {
        self.check_globals(program)?;
        for struct_def in &program.struct_defs {
            self.check_struct_def(struct_def)?;
        }
        for fun_def in &mut program.fun_defs {
            self.check_fun_def(fun_def)?;
        }
        Ok(())
    }

    //----------------------------------------------------------------------
    // Global pass
    //----------------------------------------------------------------------

    fn check_globals(&mut self, program: &Program) -> Result<(), StaticError> {
        for struct_def in &program.struct_defs {
            let name = struct_def.struct_name.lexeme.clone();
            if self.structs.contains_key(&name) {
                return Err(StaticError::new(
                    format!("duplicate struct '{}' definition", name),
                    &struct_def.struct_name,
                ));
            }
            // Reserve the built-in length operator over this struct's
            // array form.
            self.length_ids.insert(struct_length_id(&name));
            self.structs.insert(name, struct_def.clone());
        }
        for fun_def in &program.fun_defs {
            let id = fun_def.mangled_id();
            if self.functions.contains_key(&id) {
                return Err(StaticError::new(
                    format!("duplicate function '{}' definition", id),
                    &fun_def.fun_name,
                ));
            }
            if BUILT_INS.contains(&id.as_str()) || self.length_ids.contains(&id) {
                return Err(StaticError::new(
                    format!("redefining built-in function '{}'", id),
                    &fun_def.fun_name,
                ));
            }
            if id == "main" && !fun_def.return_type.is_void() {
                return Err(StaticError::new(
                    "main function must return void",
                    &fun_def.return_type.type_name,
                ));
            }
            if fun_def.fun_name.lexeme == "main" && !fun_def.params.is_empty() {
                return Err(StaticError::new(
                    "main function cannot take parameters",
                    &fun_def.fun_name,
                ));
            }
            self.functions.insert(id, fun_def.return_type.clone());
        }
        if !self.functions.contains_key("main") {
            return Err(StaticError::without_origin("missing main function"));
        }
        debug!(
            structs = self.structs.len(),
            functions = self.functions.len(),
            "registered globals"
        );
        Ok(())
    }

    //----------------------------------------------------------------------
    // Body pass
    //----------------------------------------------------------------------

    fn check_struct_def(&mut self, struct_def: &StructDef) -> Result<(), StaticError> {
        self.symbol_table.push_environment();
        for field in &struct_def.fields {
            let field_type = self.check_var_def(field)?;
            if field_type.is_void() {
                return Err(StaticError::new(
                    "struct field cannot be void",
                    &field.data_type.type_name,
                ));
            }
        }
        self.symbol_table.pop_environment();
        Ok(())
    }

    fn check_fun_def(&mut self, fun_def: &mut FunDef) -> Result<(), StaticError> {
        self.symbol_table.push_environment();
        self.check_data_type(&fun_def.return_type)?;
        // Pseudo-entry consulted by return statements.
        self.symbol_table
            .add("return", fun_def.return_type.clone());
        for param in &fun_def.params {
            self.check_var_def(param)?;
        }
        for stmt in &mut fun_def.stmts {
            self.check_stmt(stmt)?;
        }
        self.symbol_table.pop_environment();
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) -> Result<(), StaticError> {
        match stmt {
            Stmt::VarDecl(decl) => self.check_var_decl(decl),
            Stmt::Assign(assign) => self.check_assign(assign),
            Stmt::While(while_stmt) => self.check_while(while_stmt),
            Stmt::For(for_stmt) => self.check_for(for_stmt),
            Stmt::If(if_stmt) => self.check_if(if_stmt),
            Stmt::Return(ret) => self.check_return(ret),
            Stmt::Call(call) => self.check_call(call).map(|_| ()),
        }
    }

    fn check_var_decl(&mut self, decl: &mut VarDecl) -> Result<(), StaticError> {
        let lhs = self.check_var_def(&decl.var_def)?;
        if let Some(expr) = &mut decl.expr {
            let rhs = self.check_expr(expr)?;
            if !rhs.is_void() && (lhs.name() != rhs.name() || lhs.is_array != rhs.is_array) {
                return Err(StaticError::new(
                    format!(
                        "cannot initialize '{}' with a value of a different type",
                        decl.var_def.var_name.lexeme
                    ),
                    &decl.var_def.var_name,
                ));
            }
        }
        Ok(())
    }

    fn check_assign(&mut self, assign: &mut AssignStmt) -> Result<(), StaticError> {
        let lhs = self.check_path(&mut assign.lvalue)?;
        let rhs = self.check_expr(&mut assign.expr)?;
        if !rhs.is_void() && (lhs.name() != rhs.name() || lhs.is_array != rhs.is_array) {
            let last = assign.lvalue.last().expect("lvalue paths are non-empty");
            return Err(StaticError::new(
                "assignment types do not match",
                &last.var_name,
            ));
        }
        Ok(())
    }

    fn check_condition(&mut self, condition: &mut Expr, construct: &str) -> Result<(), StaticError> {
        let cond_type = self.check_expr(condition)?;
        if cond_type.name() != "bool" || cond_type.is_array {
            return Err(StaticError::new(
                format!("{} condition must be a bool", construct),
                &cond_type.type_name,
            ));
        }
        Ok(())
    }

    fn check_while(&mut self, while_stmt: &mut WhileStmt) -> Result<(), StaticError> {
        self.symbol_table.push_environment();
        self.check_condition(&mut while_stmt.condition, "while")?;
        for stmt in &mut while_stmt.stmts {
            self.check_stmt(stmt)?;
        }
        self.symbol_table.pop_environment();
        Ok(())
    }

    fn check_for(&mut self, for_stmt: &mut ForStmt) -> Result<(), StaticError> {
        self.symbol_table.push_environment();
        self.check_var_decl(&mut for_stmt.var_decl)?;
        let iterator = &for_stmt.var_decl.var_def.data_type;
        if !matches!(iterator.name(), "int" | "double") || iterator.is_array {
            return Err(StaticError::new(
                "for-loop iterator must be an int or a double",
                &iterator.type_name,
            ));
        }
        self.check_condition(&mut for_stmt.condition, "for")?;
        self.check_assign(&mut for_stmt.assign_stmt)?;
        for stmt in &mut for_stmt.stmts {
            self.check_stmt(stmt)?;
        }
        self.symbol_table.pop_environment();
        Ok(())
    }

    fn check_if(&mut self, if_stmt: &mut IfStmt) -> Result<(), StaticError> {
        self.symbol_table.push_environment();
        self.check_condition(&mut if_stmt.if_part.condition, "if")?;
        for stmt in &mut if_stmt.if_part.stmts {
            self.check_stmt(stmt)?;
        }
        self.symbol_table.pop_environment();
        for else_if in &mut if_stmt.else_ifs {
            self.symbol_table.push_environment();
            self.check_condition(&mut else_if.condition, "elseif")?;
            for stmt in &mut else_if.stmts {
                self.check_stmt(stmt)?;
            }
            self.symbol_table.pop_environment();
        }
        if !if_stmt.else_stmts.is_empty() {
            self.symbol_table.push_environment();
            for stmt in &mut if_stmt.else_stmts {
                self.check_stmt(stmt)?;
            }
            self.symbol_table.pop_environment();
        }
        Ok(())
    }

    fn check_return(&mut self, ret: &mut ReturnStmt) -> Result<(), StaticError> {
        let expr_type = self.check_expr(&mut ret.expr)?;
        let declared = self
            .symbol_table
            .get("return")
            .expect("function scope binds the return pseudo-entry")
            .clone();
        if !expr_type.is_void()
            && (expr_type.name() != declared.name() || expr_type.is_array != declared.is_array)
        {
            return Err(StaticError::new(
                "return type does not match the function's declared return type",
                &expr_type.type_name,
            ));
        }
        Ok(())
    }

    //----------------------------------------------------------------------
    // Declarations and types
    //----------------------------------------------------------------------

    /// Check a typed name and bind it in the innermost environment.
    fn check_var_def(&mut self, var_def: &VarDef) -> Result<DataType, StaticError> {
        self.check_data_type(&var_def.data_type)?;
        let name = &var_def.var_name.lexeme;
        if self.symbol_table.exists_in_curr_env(name) {
            return Err(StaticError::new(
                format!("duplicate '{}' definition", name),
                &var_def.var_name,
            ));
        }
        self.symbol_table.add(name, var_def.data_type.clone());
        Ok(var_def.data_type.clone())
    }

    /// The declared type must name `void`, a base type, or a known struct.
    fn check_data_type(&self, data_type: &DataType) -> Result<(), StaticError> {
        let name = data_type.name();
        if name == "void" || BASE_TYPES.contains(&name) || self.structs.contains_key(name) {
            return Ok(());
        }
        Err(StaticError::new(
            format!("invalid type \"{}\"", name),
            &data_type.type_name,
        ))
    }

    //----------------------------------------------------------------------
    // Expressions
    //----------------------------------------------------------------------

    fn check_expr(&mut self, expr: &mut Expr) -> Result<DataType, StaticError> {
        let lhs = match &mut expr.first {
            ExprTerm::Simple(rvalue) => self.check_rvalue(rvalue)?,
            ExprTerm::Complex(inner) => self.check_expr(inner)?,
        };
        let mut result = lhs.clone();
        if let (Some(op), Some(rest)) = (&expr.op, &mut expr.rest) {
            let rhs = self.check_expr(rest)?;
            result = self.check_binary(op, &lhs, &rhs)?;
        }
        if expr.not_op {
            if result.name() != "bool" || result.is_array {
                return Err(StaticError::new(
                    "'not' requires a bool operand",
                    &result.type_name,
                ));
            }
        }
        Ok(result)
    }

    /// The operator typing table. Operands must agree; only equality
    /// tolerates `void` (null) on either side, and no operator accepts an
    /// array operand except equality over two references of equal type.
    fn check_binary(
        &self,
        op: &Token,
        lhs: &DataType,
        rhs: &DataType,
    ) -> Result<DataType, StaticError> {
        let l = lhs.name();
        let r = rhs.name();
        if l != r && l != "void" && r != "void" {
            return Err(StaticError::new("expression types do not match", op));
        }
        let invalid = || StaticError::new(format!("invalid use of '{}'", op.lexeme), op);
        match op.lexeme.as_str() {
            "+" => {
                if scalar(lhs, &["int", "double", "string"]) && scalar(rhs, &["int", "double", "string"]) {
                    Ok(lhs.clone())
                } else {
                    Err(invalid())
                }
            }
            "-" | "*" | "/" => {
                if scalar(lhs, &["int", "double"]) && scalar(rhs, &["int", "double"]) {
                    Ok(lhs.clone())
                } else {
                    Err(invalid())
                }
            }
            "<" | "<=" | ">" | ">=" => {
                if scalar(lhs, &["int", "double", "string"]) && scalar(rhs, &["int", "double", "string"]) {
                    Ok(synth_type("bool", op))
                } else {
                    Err(invalid())
                }
            }
            "and" | "or" => {
                if scalar(lhs, &["bool"]) && scalar(rhs, &["bool"]) {
                    Ok(lhs.clone())
                } else {
                    Err(invalid())
                }
            }
            "==" | "!=" => {
                if l == "void" || r == "void" {
                    return Ok(synth_type("bool", op));
                }
                let comparable = BASE_TYPES.contains(&l) || self.structs.contains_key(l);
                if comparable && l == r && lhs.is_array == rhs.is_array {
                    Ok(synth_type("bool", op))
                } else {
                    Err(invalid())
                }
            }
            _ => Err(invalid()),
        }
    }

    fn check_rvalue(&mut self, rvalue: &mut RValue) -> Result<DataType, StaticError> {
        match rvalue {
            RValue::Simple(token) => self.check_literal(token),
            RValue::New(new_rvalue) => self.check_new(new_rvalue),
            RValue::Call(call) => self.check_call(call),
            RValue::Var(var_rvalue) => self.check_path(&mut var_rvalue.path),
        }
    }

    fn check_literal(&self, token: &Token) -> Result<DataType, StaticError> {
        let name = match token.token_type {
            TokenType::IntVal => {
                if token.lexeme.parse::<i64>().is_err() {
                    return Err(StaticError::new("int literal out of range", token));
                }
                "int"
            }
            TokenType::DoubleVal => "double",
            TokenType::StringVal => "string",
            TokenType::BoolVal => "bool",
            // null is the sole value of type void.
            TokenType::NullVal => "void",
            _ => return Err(StaticError::new("invalid literal", token)),
        };
        Ok(synth_type(name, token))
    }

    fn check_new(&mut self, new_rvalue: &mut NewRValue) -> Result<DataType, StaticError> {
        let type_name = new_rvalue.type_name.clone();
        match &mut new_rvalue.allocation {
            NewAllocation::Array(size) => {
                let name = type_name.lexeme.as_str();
                if !BASE_TYPES.contains(&name) && !self.structs.contains_key(name) {
                    return Err(StaticError::new(
                        format!("invalid array type \"{}\"", name),
                        &type_name,
                    ));
                }
                let size_type = self.check_expr(size)?;
                if size_type.name() != "int" || size_type.is_array {
                    return Err(StaticError::new(
                        "array size must be an int",
                        &size_type.type_name,
                    ));
                }
                Ok(DataType::new(true, type_name))
            }
            NewAllocation::Struct(params) => {
                let Some(struct_def) = self.structs.get(&type_name.lexeme) else {
                    return Err(StaticError::new(
                        format!("struct '{}' not defined", type_name.lexeme),
                        &type_name,
                    ));
                };
                let field_types: Vec<DataType> = struct_def
                    .fields
                    .iter()
                    .map(|field| field.data_type.clone())
                    .collect();
                if field_types.len() != params.len() {
                    return Err(StaticError::new(
                        format!(
                            "struct '{}' has {} fields but {} arguments were given",
                            type_name.lexeme,
                            field_types.len(),
                            params.len()
                        ),
                        &type_name,
                    ));
                }
                for (param, field_type) in params.iter_mut().zip(&field_types) {
                    let param_type = self.check_expr(param)?;
                    if !param_type.is_void()
                        && (param_type.name() != field_type.name()
                            || param_type.is_array != field_type.is_array)
                    {
                        return Err(StaticError::new(
                            "struct argument type does not match its field",
                            &type_name,
                        ));
                    }
                }
                Ok(DataType::new(false, type_name))
            }
        }
    }

    /// Resolve a call: infer each argument's type, form the mangled id,
    /// record it on the node, and produce the result type.
    fn check_call(&mut self, call: &mut CallExpr) -> Result<DataType, StaticError> {
        let mut arg_types = Vec::new();
        for arg in &mut call.args {
            arg_types.push(self.check_expr(arg)?);
        }
        let id = mangle_call(&call.fun_name.lexeme, &arg_types);
        call.fun_id = Some(id.clone());
        if let Some(return_type) = self.functions.get(&id) {
            return Ok(return_type.clone());
        }
        if self.length_ids.contains(&id) {
            return Ok(synth_type("int", &call.fun_name));
        }
        if let Some(result) = builtin_result_type(&id) {
            return Ok(synth_type(result, &call.fun_name));
        }
        Err(StaticError::new(
            format!("function '{}' is not defined", id),
            &call.fun_name,
        ))
    }

    /// Resolve a variable path (lvalue or rvalue): the head must be in
    /// scope; each later segment must name a field of the struct type of
    /// the segment before it; intermediate array segments must be indexed;
    /// every index expression must be an int. The result is the type of the
    /// terminal segment (the element type when indexed).
    fn check_path(&mut self, path: &mut [VarRef]) -> Result<DataType, StaticError> {
        let head = &path[0];
        let Some(mut current) = self.symbol_table.get(&head.var_name.lexeme).cloned() else {
            return Err(StaticError::new(
                format!("undefined variable '{}'", head.var_name.lexeme),
                &head.var_name,
            ));
        };
        let segments = path.len();
        for i in 0..segments {
            if i > 0 {
                let seg_name = path[i].var_name.lexeme.clone();
                let Some(struct_def) = self.structs.get(current.name()) else {
                    return Err(StaticError::new(
                        format!("'{}' is not a struct type", current.name()),
                        &path[i].var_name,
                    ));
                };
                let Some(field_type) = struct_def
                    .fields
                    .iter()
                    .find(|field| field.var_name.lexeme == seg_name)
                    .map(|field| field.data_type.clone())
                else {
                    return Err(StaticError::new(
                        format!("field '{}' not in struct '{}'", seg_name, current.name()),
                        &path[i].var_name,
                    ));
                };
                current = field_type;
            }
            let is_last = i + 1 == segments;
            if path[i].array_expr.is_some() {
                if !current.is_array {
                    return Err(StaticError::new(
                        format!("indexing non-array '{}'", path[i].var_name.lexeme),
                        &path[i].var_name,
                    ));
                }
                let index_expr = path[i].array_expr.as_deref_mut().expect("checked above");
                let index_type = self.check_expr(index_expr)?;
                if index_type.name() != "int" || index_type.is_array {
                    return Err(StaticError::new(
                        "array index must be an int",
                        &path[i].var_name,
                    ));
                }
                current = DataType::new(false, current.type_name.clone());
            } else if !is_last && current.is_array {
                return Err(StaticError::new(
                    format!("array '{}' must be indexed", path[i].var_name.lexeme),
                    &path[i].var_name,
                ));
            }
        }
        Ok(current)
    }
}

impl Default for SemanticChecker {
    fn default() -> Self {
        SemanticChecker::new()
    }
}

/// True when the type is one of the named types and not an array.
fn scalar(t: &DataType, names: &[&str]) -> bool {
    names.contains(&t.name()) && !t.is_array
}

/// A type synthesized during analysis (literal types, operator results,
/// built-in returns), positioned at the token that produced it.
fn synth_type(name: &str, at: &Token) -> DataType {
    let token_type = match name {
        "int" => TokenType::IntType,
        "double" => TokenType::DoubleType,
        "bool" => TokenType::BoolType,
        "string" => TokenType::StringType,
        "void" => TokenType::VoidType,
        _ => TokenType::Id,
    };
    DataType::new(false, Token::new(token_type, name, at.line, at.column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn check(source: &str) -> Result<Program, StaticError> {
        let mut program = parse_source(source).expect("test source must parse");
        check_program(&mut program)?;
        Ok(program)
    }

    fn check_err(source: &str) -> String {
        check(source).expect_err("expected a static error").to_string()
    }

    #[test]
    fn test_minimal_program() {
        check("void main() { }").unwrap();
    }

    #[test]
    fn test_missing_main() {
        assert!(check_err("void other() { }").contains("missing main"));
    }

    #[test]
    fn test_main_must_be_void() {
        assert!(check_err("int main() { return 0; }").contains("void"));
    }

    #[test]
    fn test_main_cannot_take_params() {
        assert!(check_err("void main(int x) { }").contains("parameters"));
    }

    #[test]
    fn test_duplicate_struct() {
        assert!(check_err("struct P { } struct P { } void main() { }").contains("duplicate"));
    }

    #[test]
    fn test_duplicate_function_id() {
        let msg = check_err("int f(int x) { return x; } int f(int y) { return y; } void main() { }");
        assert!(msg.contains("duplicate"));
    }

    #[test]
    fn test_overloads_have_distinct_ids() {
        check("int f(int x) { return x; } int f(string s) { return 0; } void main() { }").unwrap();
    }

    #[test]
    fn test_redefining_print_is_rejected() {
        assert!(check_err("void print(int x) { } void main() { }").contains("built-in"));
    }

    #[test]
    fn test_redefining_length_over_struct_array() {
        let msg = check_err("struct P { int x; } int length(array P ps) { return 0; } void main() { }");
        assert!(msg.contains("built-in"));
    }

    #[test]
    fn test_call_resolution_writes_fun_id() {
        let program = check(
            "int add(int a, int b) { return a + b; }
             void main() { int x = add(2, 3); }",
        )
        .unwrap();
        let Stmt::VarDecl(decl) = &program.fun_defs[1].stmts[0] else {
            panic!("expected declaration");
        };
        let Some(Expr {
            first: ExprTerm::Simple(RValue::Call(call)),
            ..
        }) = decl.expr.as_ref()
        else {
            panic!("expected call");
        };
        assert_eq!(call.fun_id.as_deref(), Some("add_int_int"));
    }

    #[test]
    fn test_print_overloads_resolve_by_argument_type() {
        let program = check("void main() { print(1); print(\"s\"); print(1.5); print(true); }")
            .unwrap();
        let ids: Vec<&str> = program.fun_defs[0]
            .stmts
            .iter()
            .map(|stmt| match stmt {
                Stmt::Call(call) => call.fun_id.as_deref().unwrap(),
                other => panic!("expected call, got {:?}", other),
            })
            .collect();
        assert_eq!(
            ids,
            vec!["print_int", "print_string", "print_double", "print_bool"]
        );
    }

    #[test]
    fn test_call_to_undefined_function() {
        assert!(check_err("void main() { frobnicate(1); }").contains("not defined"));
    }

    #[test]
    fn test_arity_is_part_of_identity() {
        let msg = check_err("int f(int x) { return x; } void main() { int y = f(1, 2); }");
        assert!(msg.contains("f_int_int"));
    }

    #[test]
    fn test_length_builtin_forms() {
        check(
            "struct P { int x; }
             void main() {
               int a = length(\"abc\");
               int b = length(new int[3]);
               int c = length(new P[2]);
             }",
        )
        .unwrap();
    }

    #[test]
    fn test_undefined_variable() {
        assert!(check_err("void main() { x = 1; }").contains("undefined variable"));
    }

    #[test]
    fn test_duplicate_variable_in_same_scope() {
        assert!(check_err("void main() { int x = 1; int x = 2; }").contains("duplicate"));
    }

    #[test]
    fn test_shadowing_in_inner_scope() {
        check("void main() { int x = 1; while (true) { double x = 2.0; } }").unwrap();
    }

    #[test]
    fn test_inner_binding_expires_with_scope() {
        check(
            "void main() {
               while (true) { int y = 1; }
               while (true) { string y = \"s\"; }
             }",
        )
        .unwrap();
    }

    #[test]
    fn test_declaration_type_mismatch() {
        assert!(check_err("void main() { int x = \"s\"; }").contains("different type"));
    }

    #[test]
    fn test_null_initializes_any_type() {
        check(
            "struct P { int x; }
             void main() { int a = null; string b = null; P p = null; array int c = null; }",
        )
        .unwrap();
    }

    #[test]
    fn test_array_and_scalar_do_not_unify() {
        assert!(check_err("void main() { int x = new int[3]; }").contains("different type"));
    }

    #[test]
    fn test_invalid_declared_type() {
        assert!(check_err("void main() { Widget w = null; }").contains("invalid type"));
    }

    #[test]
    fn test_void_condition_rejected() {
        assert!(check_err("void main() { while (1) { } }").contains("bool"));
        assert!(check_err("void main() { if (\"s\") { } }").contains("bool"));
    }

    #[test]
    fn test_operator_table() {
        check("void main() { int a = 1 + 2; double b = 1.0 / 2.0; string c = \"a\" + \"b\"; }")
            .unwrap();
        assert!(check_err("void main() { int a = 1 + 1.5; }").contains("do not match"));
        assert!(check_err("void main() { string s = \"a\" - \"b\"; }").contains("invalid use"));
        assert!(check_err("void main() { bool b = 1 and 2; }").contains("invalid use"));
        check("void main() { bool b = 1 < 2; bool c = \"a\" <= \"b\"; bool d = not (1 == 2); }")
            .unwrap();
    }

    #[test]
    fn test_not_requires_bool() {
        assert!(check_err("void main() { bool b = not 1; }").contains("bool"));
    }

    #[test]
    fn test_equality_with_null() {
        check(
            "struct P { int x; }
             void main() {
               P p = null;
               bool a = p == null;
               bool b = null == null;
               bool c = 1 != null;
             }",
        )
        .unwrap();
    }

    #[test]
    fn test_struct_equality_same_type_only() {
        check(
            "struct P { int x; }
             void main() { P a = null; P b = null; bool e = a == b; }",
        )
        .unwrap();
        let msg = check_err(
            "struct P { int x; } struct Q { int x; }
             void main() { P a = null; Q b = null; bool e = a == b; }",
        );
        assert!(msg.contains("do not match"));
    }

    #[test]
    fn test_return_type_checked() {
        assert!(
            check_err("struct P { int x; } int f() { return new P(1); } void main() { }")
                .contains("return type")
        );
        check("int f() { return null; } void main() { }").unwrap();
        check("void f() { return null; } void main() { }").unwrap();
    }

    #[test]
    fn test_struct_construction() {
        check("struct P { int x; int y; } void main() { P p = new P(1, 2); }").unwrap();
        assert!(
            check_err("struct P { int x; int y; } void main() { P p = new P(1); }")
                .contains("fields")
        );
        assert!(
            check_err("struct P { int x; } void main() { P p = new P(\"s\"); }")
                .contains("does not match")
        );
        check("struct P { int x; } void main() { P p = new P(null); }").unwrap();
    }

    #[test]
    fn test_new_undefined_struct() {
        assert!(check_err("void main() { Q q = null; q = new Q(); }").contains("invalid type"));
    }

    #[test]
    fn test_field_access() {
        check(
            "struct P { int x; }
             void main() { P p = new P(1); int v = p.x; p.x = 2; }",
        )
        .unwrap();
        assert!(
            check_err("struct P { int x; } void main() { P p = new P(1); int v = p.z; }")
                .contains("field 'z'")
        );
    }

    #[test]
    fn test_nested_paths() {
        check(
            "struct Inner { int v; }
             struct Outer { Inner inner; array Inner items; }
             void main() {
               Outer o = new Outer(new Inner(1), new Inner[2]);
               int a = o.inner.v;
               int b = o.items[0].v;
               o.items[1] = new Inner(5);
             }",
        )
        .unwrap();
    }

    #[test]
    fn test_intermediate_array_must_be_indexed() {
        let msg = check_err(
            "struct Inner { int v; }
             struct Outer { array Inner items; }
             void main() { Outer o = null; int a = o.items.v; }",
        );
        assert!(msg.contains("must be indexed"));
    }

    #[test]
    fn test_indexing_non_array() {
        assert!(check_err("void main() { int x = 1; int y = x[0]; }").contains("non-array"));
    }

    #[test]
    fn test_index_must_be_int() {
        let msg = check_err("void main() { array int a = new int[2]; int x = a[\"s\"]; }");
        assert!(msg.contains("int"));
    }

    #[test]
    fn test_field_on_non_struct() {
        assert!(check_err("void main() { int x = 1; int y = x.f; }").contains("not a struct"));
    }

    #[test]
    fn test_void_struct_field_rejected() {
        // The grammar cannot produce one, but a hand-built tree can.
        use crate::token::{Token, TokenType};
        let mut program = parse_source("void main() { }").unwrap();
        program.struct_defs.push(StructDef {
            struct_name: Token::new(TokenType::Id, "P", 1, 1),
            fields: vec![VarDef {
                data_type: DataType::new(false, Token::new(TokenType::VoidType, "void", 1, 1)),
                var_name: Token::new(TokenType::Id, "x", 1, 1),
            }],
        });
        let err = check_program(&mut program).unwrap_err();
        assert!(err.to_string().contains("void"));
    }

    #[test]
    fn test_for_loop_iterator_types() {
        check("void main() { for (int i = 0; i < 3; i = i + 1) { } }").unwrap();
        assert!(
            check_err("void main() { for (string s = \"\"; true; s = s) { } }")
                .contains("iterator")
        );
    }

    #[test]
    fn test_conversion_builtins() {
        check(
            "void main() {
               string a = itos(1);
               string b = dtos(1.5);
               double c = itod(1);
               int d = dtoi(1.5);
               int e = stoi(\"4\");
               double f = stod(\"4.5\");
               string g = get(0, \"abc\");
               string h = input();
             }",
        )
        .unwrap();
    }

    #[test]
    fn test_int_literal_out_of_range() {
        assert!(
            check_err("void main() { int x = 99999999999999999999; }").contains("out of range")
        );
    }

    #[test]
    fn test_error_position_reported() {
        let err = check("void main() {\n  undefined_var = 1;\n}").unwrap_err();
        assert_eq!(err.origin, Some((2, 3)));
    }
}
