//! Canonical source printer
//!
//! Renders a `Program` back to surface syntax: two-space indent, one
//! statement per line, parenthesized sub-expressions preserved. The output
//! re-lexes and re-parses to a structurally equal program, which is what the
//! round-trip tests lean on.

use crate::ast::{
    AssignStmt, BasicIf, CallExpr, DataType, Expr, ExprTerm, FunDef, IfStmt, NewAllocation,
    NewRValue, Program, RValue, Stmt, StructDef, VarDecl, VarRValue, VarRef,
};
use crate::token::TokenType;

/// Render a whole program.
pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    for struct_def in &program.struct_defs {
        print_struct_def(&mut out, struct_def);
        out.push('\n');
    }
    for fun_def in &program.fun_defs {
        print_fun_def(&mut out, fun_def);
        out.push('\n');
    }
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn print_struct_def(out: &mut String, struct_def: &StructDef) {
    out.push_str("struct ");
    out.push_str(&struct_def.struct_name.lexeme);
    out.push_str(" {\n");
    for field in &struct_def.fields {
        indent(out, 1);
        print_data_type(out, &field.data_type);
        out.push(' ');
        out.push_str(&field.var_name.lexeme);
        out.push_str(";\n");
    }
    out.push_str("}\n");
}

fn print_fun_def(out: &mut String, fun_def: &FunDef) {
    print_data_type(out, &fun_def.return_type);
    out.push(' ');
    out.push_str(&fun_def.fun_name.lexeme);
    out.push('(');
    for (i, param) in fun_def.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_data_type(out, &param.data_type);
        out.push(' ');
        out.push_str(&param.var_name.lexeme);
    }
    out.push_str(") {\n");
    for stmt in &fun_def.stmts {
        print_stmt(out, stmt, 1);
    }
    out.push_str("}\n");
}

fn print_data_type(out: &mut String, data_type: &DataType) {
    if data_type.is_array {
        out.push_str("array ");
    }
    out.push_str(&data_type.type_name.lexeme);
}

fn print_stmt(out: &mut String, stmt: &Stmt, level: usize) {
    match stmt {
        Stmt::VarDecl(decl) => {
            indent(out, level);
            print_var_decl(out, decl);
            out.push_str(";\n");
        }
        Stmt::Assign(assign) => {
            indent(out, level);
            print_assign(out, assign);
            out.push_str(";\n");
        }
        Stmt::Return(ret) => {
            indent(out, level);
            out.push_str("return ");
            print_expr(out, &ret.expr);
            out.push_str(";\n");
        }
        Stmt::Call(call) => {
            indent(out, level);
            print_call(out, call);
            out.push_str(";\n");
        }
        Stmt::While(while_stmt) => {
            indent(out, level);
            out.push_str("while (");
            print_expr(out, &while_stmt.condition);
            out.push_str(") {\n");
            for stmt in &while_stmt.stmts {
                print_stmt(out, stmt, level + 1);
            }
            indent(out, level);
            out.push_str("}\n");
        }
        Stmt::For(for_stmt) => {
            indent(out, level);
            out.push_str("for (");
            print_var_decl(out, &for_stmt.var_decl);
            out.push_str("; ");
            print_expr(out, &for_stmt.condition);
            out.push_str("; ");
            print_assign(out, &for_stmt.assign_stmt);
            out.push_str(") {\n");
            for stmt in &for_stmt.stmts {
                print_stmt(out, stmt, level + 1);
            }
            indent(out, level);
            out.push_str("}\n");
        }
        Stmt::If(if_stmt) => print_if(out, if_stmt, level),
    }
}

fn print_var_decl(out: &mut String, decl: &VarDecl) {
    print_data_type(out, &decl.var_def.data_type);
    out.push(' ');
    out.push_str(&decl.var_def.var_name.lexeme);
    if let Some(expr) = &decl.expr {
        out.push_str(" = ");
        print_expr(out, expr);
    }
}

fn print_assign(out: &mut String, assign: &AssignStmt) {
    print_path(out, &assign.lvalue);
    out.push_str(" = ");
    print_expr(out, &assign.expr);
}

fn print_if(out: &mut String, if_stmt: &IfStmt, level: usize) {
    indent(out, level);
    out.push_str("if ");
    print_basic_if(out, &if_stmt.if_part, level);
    for else_if in &if_stmt.else_ifs {
        indent(out, level);
        out.push_str("elseif ");
        print_basic_if(out, else_if, level);
    }
    if !if_stmt.else_stmts.is_empty() {
        indent(out, level);
        out.push_str("else {\n");
        for stmt in &if_stmt.else_stmts {
            print_stmt(out, stmt, level + 1);
        }
        indent(out, level);
        out.push_str("}\n");
    }
}

fn print_basic_if(out: &mut String, basic_if: &BasicIf, level: usize) {
    out.push('(');
    print_expr(out, &basic_if.condition);
    out.push_str(") {\n");
    for stmt in &basic_if.stmts {
        print_stmt(out, stmt, level + 1);
    }
    indent(out, level);
    out.push_str("}\n");
}

fn print_expr(out: &mut String, expr: &Expr) {
    if expr.not_op {
        out.push_str("not ");
    }
    match &expr.first {
        ExprTerm::Simple(rvalue) => print_rvalue(out, rvalue),
        ExprTerm::Complex(inner) => {
            out.push('(');
            print_expr(out, inner);
            out.push(')');
        }
    }
    if let (Some(op), Some(rest)) = (&expr.op, &expr.rest) {
        out.push(' ');
        out.push_str(&op.lexeme);
        out.push(' ');
        print_expr(out, rest);
    }
}

fn print_rvalue(out: &mut String, rvalue: &RValue) {
    match rvalue {
        RValue::Simple(token) => {
            // String lexemes are stored raw, without their quotes.
            if token.token_type == TokenType::StringVal {
                out.push('"');
                out.push_str(&token.lexeme);
                out.push('"');
            } else {
                out.push_str(&token.lexeme);
            }
        }
        RValue::New(new_rvalue) => print_new(out, new_rvalue),
        RValue::Call(call) => print_call(out, call),
        RValue::Var(VarRValue { path }) => print_path(out, path),
    }
}

fn print_new(out: &mut String, new_rvalue: &NewRValue) {
    out.push_str("new ");
    out.push_str(&new_rvalue.type_name.lexeme);
    match &new_rvalue.allocation {
        NewAllocation::Array(size) => {
            out.push('[');
            print_expr(out, size);
            out.push(']');
        }
        NewAllocation::Struct(params) => {
            out.push('(');
            for (i, param) in params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                print_expr(out, param);
            }
            out.push(')');
        }
    }
}

fn print_call(out: &mut String, call: &CallExpr) {
    out.push_str(&call.fun_name.lexeme);
    out.push('(');
    for (i, arg) in call.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_expr(out, arg);
    }
    out.push(')');
}

fn print_path(out: &mut String, path: &[VarRef]) {
    for (i, var_ref) in path.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&var_ref.var_name.lexeme);
        if let Some(index) = &var_ref.array_expr {
            out.push('[');
            print_expr(out, index);
            out.push(']');
        }
    }
}
