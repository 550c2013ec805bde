//! Opal Compiler Library
//!
//! The end-to-end pipeline from source text to executable behavior: a lexer
//! producing tokens on demand, a recursive-descent parser building a typed
//! AST, a semantic analyzer resolving names, types, and overloads, and a
//! code generator emitting frame templates for the Opal VM.
//!
//! ```rust,ignore
//! use opalc::compile_source;
//! use opal_vm::VM;
//!
//! let templates = compile_source("void main() { print(\"hi\"); }")?;
//! let mut vm = VM::new();
//! for template in templates {
//!     vm.add_frame_template(template);
//! }
//! vm.run()?;
//! ```

pub mod ast;
pub mod builtins;
pub mod checker;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod symbol_table;
pub mod token;

pub use checker::check_program;
pub use codegen::generate_program;
pub use error::{CompileError, LexerError, ParserError, StaticError};
pub use lexer::Lexer;
pub use parser::Parser;
pub use printer::print_program;
pub use token::{Token, TokenType};

use ast::Program;
use opal_vm::VMFrameTemplate;
use tracing::debug;

/// Lex, parse, and analyze a source string, returning the annotated program.
pub fn check_source(source: &str) -> Result<Program, CompileError> {
    let mut program = parser::parse_source(source)?;
    check_program(&mut program)?;
    debug!(
        structs = program.struct_defs.len(),
        functions = program.fun_defs.len(),
        "analysis complete"
    );
    Ok(program)
}

/// Run the whole front end: source text in, frame templates out.
pub fn compile_source(source: &str) -> Result<Vec<VMFrameTemplate>, CompileError> {
    let program = check_source(source)?;
    Ok(generate_program(&program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_produces_main() {
        let templates = compile_source("void main() { }").unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].function_id, "main");
    }

    #[test]
    fn test_compile_source_surfaces_each_error_kind() {
        assert!(matches!(
            compile_source("void main() { int x = 07; }"),
            Err(CompileError::Lexer(_))
        ));
        assert!(matches!(
            compile_source("void main() { int = 1; }"),
            Err(CompileError::Parser(_))
        ));
        assert!(matches!(
            compile_source("void main() { y = 1; }"),
            Err(CompileError::Static(_))
        ));
    }

    #[test]
    fn test_every_resolved_call_names_a_template_or_builtin() {
        use crate::builtins::{BASE_LENGTH_IDS, BUILT_INS};
        let source = "int add(int a, int b) { return a + b; }
                      void main() { print(add(2, 3)); print(length(\"abc\")); }";
        let program = check_source(source).unwrap();
        let templates = generate_program(&program);
        let ids: Vec<String> = templates.iter().map(|t| t.function_id.clone()).collect();
        for fun in &program.fun_defs {
            for stmt in &fun.stmts {
                collect_call_ids(stmt, &mut |id| {
                    let known = ids.iter().any(|t| t == id)
                        || BUILT_INS.contains(&id)
                        || BASE_LENGTH_IDS.contains(&id);
                    assert!(known, "unresolved call id '{}'", id);
                });
            }
        }
    }

    fn collect_call_ids(stmt: &ast::Stmt, visit: &mut dyn FnMut(&str)) {
        use ast::{ExprTerm, RValue, Stmt};
        fn walk_expr(expr: &ast::Expr, visit: &mut dyn FnMut(&str)) {
            match &expr.first {
                ExprTerm::Simple(RValue::Call(call)) => {
                    visit(call.fun_id.as_deref().expect("resolved"));
                    for arg in &call.args {
                        walk_expr(arg, visit);
                    }
                }
                ExprTerm::Complex(inner) => walk_expr(inner, visit),
                _ => {}
            }
            if let Some(rest) = &expr.rest {
                walk_expr(rest, visit);
            }
        }
        match stmt {
            Stmt::Call(call) => {
                visit(call.fun_id.as_deref().expect("resolved"));
                for arg in &call.args {
                    walk_expr(arg, visit);
                }
            }
            Stmt::VarDecl(decl) => {
                if let Some(expr) = &decl.expr {
                    walk_expr(expr, visit);
                }
            }
            Stmt::Assign(assign) => walk_expr(&assign.expr, visit),
            Stmt::Return(ret) => walk_expr(&ret.expr, visit),
            Stmt::While(w) => {
                walk_expr(&w.condition, visit);
                for stmt in &w.stmts {
                    collect_call_ids(stmt, visit);
                }
            }
            Stmt::For(f) => {
                walk_expr(&f.condition, visit);
                for stmt in &f.stmts {
                    collect_call_ids(stmt, visit);
                }
            }
            Stmt::If(i) => {
                walk_expr(&i.if_part.condition, visit);
                for stmt in &i.if_part.stmts {
                    collect_call_ids(stmt, visit);
                }
                for else_if in &i.else_ifs {
                    for stmt in &else_if.stmts {
                        collect_call_ids(stmt, visit);
                    }
                }
                for stmt in &i.else_stmts {
                    collect_call_ids(stmt, visit);
                }
            }
        }
    }
}
