//! Bytecode generation for Opal
//!
//! Walks the type-checked AST and emits one `VMFrameTemplate` per function,
//! keyed by the function's mangled id. Forward jumps are emitted with a
//! placeholder operand and back-patched once the target index is known; the
//! landing pad is always a trailing `NOP`.
//!
//! The per-function variable table maps source names to dense slot indices.
//! Slots are never reused, even after a scope pops, so the `STORE`
//! append-or-overwrite protocol in the VM lines up with emission order.

use crate::ast::{
    AssignStmt, CallExpr, Expr, ExprTerm, ForStmt, FunDef, IfStmt, NewAllocation, NewRValue,
    Program, RValue, Stmt, StructDef, VarDecl, VarRef, WhileStmt,
};
use crate::builtins::{BASE_LENGTH_IDS, builtin_instruction, struct_length_id};
use crate::token::TokenType;
use opal_vm::{Instruction, VMFrameTemplate, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Placeholder jump operand, overwritten by back-patching.
const PATCHED_LATER: usize = usize::MAX;

/// Generate frame templates for every function in an analyzed program.
///
/// The program must have passed semantic analysis: the generator leans on
/// resolved call ids, registered struct layouts, and in-scope variables.
pub fn generate_program(program: &Program) -> Vec<VMFrameTemplate> {
    CodeGenerator::new().generate(program)
}

pub struct CodeGenerator {
    /// struct name -> definition, for positional field names in `new`.
    struct_defs: HashMap<String, StructDef>,
    /// Ids of the `length` built-in family, grown per struct.
    length_ids: HashSet<String>,
}

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator {
            struct_defs: HashMap::new(),
            length_ids: BASE_LENGTH_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn generate(mut self, program: &Program) -> Vec<VMFrameTemplate> {
        for struct_def in &program.struct_defs {
            let name = struct_def.struct_name.lexeme.clone();
            self.length_ids.insert(struct_length_id(&name));
            self.struct_defs.insert(name, struct_def.clone());
        }
        program
            .fun_defs
            .iter()
            .map(|fun_def| self.gen_fun_def(fun_def))
            .collect()
    }

    fn gen_fun_def(&self, fun_def: &FunDef) -> VMFrameTemplate {
        let mut template = VMFrameTemplate::new(fun_def.mangled_id(), fun_def.params.len());
        let instrs = &mut template.instructions;
        let mut vars = VarTable::new();
        vars.push_environment();
        // The caller pushed arguments in reverse; storing in declared order
        // consumes them correctly.
        for param in &fun_def.params {
            let slot = vars.add(&param.var_name.lexeme);
            instrs.push(Instruction::Store(slot));
        }
        for stmt in &fun_def.stmts {
            self.gen_stmt(stmt, instrs, &mut vars);
        }
        if fun_def.return_type.is_void() {
            instrs.push(Instruction::Push(Value::Null));
            instrs.push(Instruction::Ret);
        }
        vars.pop_environment();
        debug!(
            function = %template.function_id,
            instructions = template.instructions.len(),
            "generated frame template"
        );
        template
    }

    fn gen_stmt(&self, stmt: &Stmt, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        match stmt {
            Stmt::VarDecl(decl) => self.gen_var_decl(decl, instrs, vars),
            Stmt::Assign(assign) => self.gen_assign(assign, instrs, vars),
            Stmt::While(while_stmt) => self.gen_while(while_stmt, instrs, vars),
            Stmt::For(for_stmt) => self.gen_for(for_stmt, instrs, vars),
            Stmt::If(if_stmt) => self.gen_if(if_stmt, instrs, vars),
            Stmt::Return(ret) => {
                self.gen_expr(&ret.expr, instrs, vars);
                instrs.push(Instruction::Ret);
            }
            Stmt::Call(call) => self.gen_call(call, instrs, vars),
        }
    }

    fn gen_var_decl(&self, decl: &VarDecl, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        let slot = vars.add(&decl.var_def.var_name.lexeme);
        match &decl.expr {
            Some(expr) => self.gen_expr(expr, instrs, vars),
            None => instrs.push(Instruction::Push(Value::Null)),
        }
        instrs.push(Instruction::Store(slot));
    }

    fn gen_assign(&self, assign: &AssignStmt, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        let lvalue = &assign.lvalue;
        let head = &lvalue[0];
        let head_slot = vars.get(&head.var_name.lexeme);
        if lvalue.len() == 1 {
            match &head.array_expr {
                // a[i] = e  pushes id, index, value, then SETI
                Some(index) => {
                    instrs.push(Instruction::Load(head_slot));
                    self.gen_expr(index, instrs, vars);
                    self.gen_expr(&assign.expr, instrs, vars);
                    instrs.push(Instruction::SetI);
                }
                // a = e  stores straight into the slot
                None => {
                    self.gen_expr(&assign.expr, instrs, vars);
                    instrs.push(Instruction::Store(head_slot));
                }
            }
            return;
        }
        // Pathed lvalue: load the head, walk intermediate loads, then set
        // the terminal field or element.
        instrs.push(Instruction::Load(head_slot));
        if let Some(index) = &head.array_expr {
            self.gen_expr(index, instrs, vars);
            instrs.push(Instruction::GetI);
        }
        for var_ref in &lvalue[1..lvalue.len() - 1] {
            instrs.push(Instruction::GetF(var_ref.var_name.lexeme.clone()));
            if let Some(index) = &var_ref.array_expr {
                self.gen_expr(index, instrs, vars);
                instrs.push(Instruction::GetI);
            }
        }
        let last = &lvalue[lvalue.len() - 1];
        match &last.array_expr {
            Some(index) => {
                instrs.push(Instruction::GetF(last.var_name.lexeme.clone()));
                self.gen_expr(index, instrs, vars);
                self.gen_expr(&assign.expr, instrs, vars);
                instrs.push(Instruction::SetI);
            }
            None => {
                self.gen_expr(&assign.expr, instrs, vars);
                instrs.push(Instruction::SetF(last.var_name.lexeme.clone()));
            }
        }
    }

    fn gen_while(&self, while_stmt: &WhileStmt, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        let condition_index = instrs.len();
        self.gen_expr(&while_stmt.condition, instrs, vars);
        let exit_jump = instrs.len();
        instrs.push(Instruction::JmpF(PATCHED_LATER));
        vars.push_environment();
        for stmt in &while_stmt.stmts {
            self.gen_stmt(stmt, instrs, vars);
        }
        vars.pop_environment();
        instrs.push(Instruction::Jmp(condition_index));
        instrs.push(Instruction::Nop);
        instrs[exit_jump] = Instruction::JmpF(instrs.len() - 1);
    }

    fn gen_for(&self, for_stmt: &ForStmt, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        vars.push_environment();
        self.gen_var_decl(&for_stmt.var_decl, instrs, vars);
        let condition_index = instrs.len();
        self.gen_expr(&for_stmt.condition, instrs, vars);
        let exit_jump = instrs.len();
        instrs.push(Instruction::JmpF(PATCHED_LATER));
        vars.push_environment();
        for stmt in &for_stmt.stmts {
            self.gen_stmt(stmt, instrs, vars);
        }
        vars.pop_environment();
        self.gen_assign(&for_stmt.assign_stmt, instrs, vars);
        instrs.push(Instruction::Jmp(condition_index));
        instrs.push(Instruction::Nop);
        instrs[exit_jump] = Instruction::JmpF(instrs.len() - 1);
        vars.pop_environment();
    }

    fn gen_if(&self, if_stmt: &IfStmt, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        // Every taken branch jumps to the shared NOP at the end of the
        // cascade; every failed condition falls through to the next branch.
        let mut end_jumps = Vec::new();

        self.gen_expr(&if_stmt.if_part.condition, instrs, vars);
        let mut next_branch = instrs.len();
        instrs.push(Instruction::JmpF(PATCHED_LATER));
        vars.push_environment();
        for stmt in &if_stmt.if_part.stmts {
            self.gen_stmt(stmt, instrs, vars);
        }
        vars.pop_environment();
        end_jumps.push(instrs.len());
        instrs.push(Instruction::Jmp(PATCHED_LATER));
        instrs[next_branch] = Instruction::JmpF(instrs.len());

        for else_if in &if_stmt.else_ifs {
            self.gen_expr(&else_if.condition, instrs, vars);
            next_branch = instrs.len();
            instrs.push(Instruction::JmpF(PATCHED_LATER));
            vars.push_environment();
            for stmt in &else_if.stmts {
                self.gen_stmt(stmt, instrs, vars);
            }
            vars.pop_environment();
            end_jumps.push(instrs.len());
            instrs.push(Instruction::Jmp(PATCHED_LATER));
            instrs[next_branch] = Instruction::JmpF(instrs.len());
        }

        if !if_stmt.else_stmts.is_empty() {
            vars.push_environment();
            for stmt in &if_stmt.else_stmts {
                self.gen_stmt(stmt, instrs, vars);
            }
            vars.pop_environment();
        }

        instrs.push(Instruction::Nop);
        let landing_pad = instrs.len() - 1;
        for jump in end_jumps {
            instrs[jump] = Instruction::Jmp(landing_pad);
        }
    }

    fn gen_call(&self, call: &CallExpr, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        for arg in &call.args {
            self.gen_expr(arg, instrs, vars);
        }
        let id = call
            .fun_id
            .as_ref()
            .expect("call ids are resolved during semantic analysis");
        if let Some(instruction) = builtin_instruction(id) {
            instrs.push(instruction);
        } else if self.length_ids.contains(id) {
            instrs.push(Instruction::Len);
        } else {
            instrs.push(Instruction::Call(id.clone()));
        }
    }

    fn gen_expr(&self, expr: &Expr, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        match (&expr.op, &expr.rest) {
            // The VM has no greater-than opcodes: swap the operand order
            // and use the less-than family.
            (Some(op), Some(rest)) if op.lexeme == ">" || op.lexeme == ">=" => {
                self.gen_expr(rest, instrs, vars);
                self.gen_term(&expr.first, instrs, vars);
                instrs.push(if op.lexeme == ">" {
                    Instruction::CmpLt
                } else {
                    Instruction::CmpLe
                });
            }
            (Some(op), Some(rest)) => {
                self.gen_term(&expr.first, instrs, vars);
                self.gen_expr(rest, instrs, vars);
                let instruction = match op.lexeme.as_str() {
                    "+" => Instruction::Add,
                    "-" => Instruction::Sub,
                    "*" => Instruction::Mul,
                    "/" => Instruction::Div,
                    "and" => Instruction::And,
                    "or" => Instruction::Or,
                    "==" => Instruction::CmpEq,
                    "!=" => Instruction::CmpNe,
                    "<" => Instruction::CmpLt,
                    "<=" => Instruction::CmpLe,
                    other => unreachable!("unknown binary operator '{}'", other),
                };
                instrs.push(instruction);
            }
            _ => self.gen_term(&expr.first, instrs, vars),
        }
        if expr.not_op {
            instrs.push(Instruction::Not);
        }
    }

    fn gen_term(&self, term: &ExprTerm, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        match term {
            ExprTerm::Simple(rvalue) => self.gen_rvalue(rvalue, instrs, vars),
            ExprTerm::Complex(inner) => self.gen_expr(inner, instrs, vars),
        }
    }

    fn gen_rvalue(&self, rvalue: &RValue, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        match rvalue {
            RValue::Simple(token) => {
                let value = match token.token_type {
                    TokenType::IntVal => Value::Int(
                        token
                            .lexeme
                            .parse()
                            .expect("int literals are range-checked during analysis"),
                    ),
                    TokenType::DoubleVal => Value::Double(
                        token
                            .lexeme
                            .parse()
                            .expect("double literals are digits and a dot"),
                    ),
                    // The two supported escapes are resolved at emit time.
                    TokenType::StringVal => {
                        Value::Str(token.lexeme.replace("\\n", "\n").replace("\\t", "\t"))
                    }
                    TokenType::BoolVal => Value::Bool(token.lexeme == "true"),
                    TokenType::NullVal => Value::Null,
                    other => unreachable!("literal token of kind {:?}", other),
                };
                instrs.push(Instruction::Push(value));
            }
            RValue::New(new_rvalue) => self.gen_new(new_rvalue, instrs, vars),
            RValue::Call(call) => self.gen_call(call, instrs, vars),
            RValue::Var(var_rvalue) => self.gen_path(&var_rvalue.path, instrs, vars),
        }
    }

    fn gen_new(&self, new_rvalue: &NewRValue, instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        match &new_rvalue.allocation {
            NewAllocation::Array(size) => {
                self.gen_expr(size, instrs, vars);
                instrs.push(Instruction::AllocA);
            }
            NewAllocation::Struct(params) => {
                let struct_def = self
                    .struct_defs
                    .get(&new_rvalue.type_name.lexeme)
                    .expect("struct types are validated during analysis");
                instrs.push(Instruction::AllocS);
                // Positional construction: duplicate the id, evaluate the
                // argument, set the field at the matching position.
                for (param, field) in params.iter().zip(&struct_def.fields) {
                    instrs.push(Instruction::Dup);
                    self.gen_expr(param, instrs, vars);
                    instrs.push(Instruction::SetF(field.var_name.lexeme.clone()));
                }
            }
        }
    }

    fn gen_path(&self, path: &[VarRef], instrs: &mut Vec<Instruction>, vars: &mut VarTable) {
        let head = &path[0];
        instrs.push(Instruction::Load(vars.get(&head.var_name.lexeme)));
        if let Some(index) = &head.array_expr {
            self.gen_expr(index, instrs, vars);
            instrs.push(Instruction::GetI);
        }
        for var_ref in &path[1..] {
            instrs.push(Instruction::GetF(var_ref.var_name.lexeme.clone()));
            if let Some(index) = &var_ref.array_expr {
                self.gen_expr(index, instrs, vars);
                instrs.push(Instruction::GetI);
            }
        }
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        CodeGenerator::new()
    }
}

/// Per-function variable table: a stack of environments mapping names to
/// slot indices. `add` always hands out a fresh slot; popping a scope drops
/// the bindings but never frees the slots.
struct VarTable {
    environments: Vec<HashMap<String, usize>>,
    total_slots: usize,
}

impl VarTable {
    fn new() -> Self {
        VarTable {
            environments: Vec::new(),
            total_slots: 0,
        }
    }

    fn push_environment(&mut self) {
        self.environments.push(HashMap::new());
    }

    fn pop_environment(&mut self) {
        self.environments.pop();
    }

    fn add(&mut self, name: &str) -> usize {
        let slot = self.total_slots;
        self.total_slots += 1;
        if let Some(env) = self.environments.last_mut() {
            env.insert(name.to_string(), slot);
        }
        slot
    }

    fn get(&self, name: &str) -> usize {
        *self
            .environments
            .iter()
            .rev()
            .find_map(|env| env.get(name))
            .expect("variables are resolved during semantic analysis")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::check_program;
    use crate::parser::parse_source;

    fn generate(source: &str) -> Vec<VMFrameTemplate> {
        let mut program = parse_source(source).expect("test source must parse");
        check_program(&mut program).expect("test source must analyze");
        generate_program(&program)
    }

    fn find<'a>(templates: &'a [VMFrameTemplate], id: &str) -> &'a VMFrameTemplate {
        templates
            .iter()
            .find(|t| t.function_id == id)
            .unwrap_or_else(|| panic!("no template '{}'", id))
    }

    #[test]
    fn test_templates_keyed_by_mangled_id() {
        let templates = generate(
            "int f(int x) { return x; }
             int f(string s) { return 0; }
             void main() { }",
        );
        assert_eq!(templates.len(), 3);
        assert_eq!(find(&templates, "f_int").arg_count, 1);
        assert_eq!(find(&templates, "f_string").arg_count, 1);
        assert_eq!(find(&templates, "main").arg_count, 0);
    }

    #[test]
    fn test_void_fall_through_ends_with_ret() {
        let templates = generate("void main() { print(1); }");
        let main = find(&templates, "main");
        let n = main.instructions.len();
        assert_eq!(main.instructions[n - 2], Instruction::Push(Value::Null));
        assert_eq!(main.instructions[n - 1], Instruction::Ret);
    }

    #[test]
    fn test_parameter_prologue_stores_in_order() {
        let templates = generate("int f(int a, int b) { return a; } void main() { }");
        let f = find(&templates, "f_int_int");
        assert_eq!(f.instructions[0], Instruction::Store(0));
        assert_eq!(f.instructions[1], Instruction::Store(1));
    }

    #[test]
    fn test_literal_emission() {
        let templates = generate("void main() { print(\"a\\nb\\tc\"); }");
        let main = find(&templates, "main");
        assert_eq!(
            main.instructions[0],
            Instruction::Push(Value::Str("a\nb\tc".to_string()))
        );
        assert_eq!(main.instructions[1], Instruction::Write);
    }

    #[test]
    fn test_builtin_calls_compile_to_single_instructions() {
        let templates = generate(
            "void main() {
               string s = input();
               int i = stoi(s);
               double d = itod(i);
               string t = dtos(d);
               int n = length(t);
               string c = get(0, t);
             }",
        );
        let main = find(&templates, "main");
        for expected in [
            Instruction::Read,
            Instruction::ToInt,
            Instruction::ToDbl,
            Instruction::ToStr,
            Instruction::Len,
            Instruction::GetC,
        ] {
            assert!(
                main.instructions.contains(&expected),
                "missing {:?} in {:?}",
                expected,
                main.instructions
            );
        }
    }

    #[test]
    fn test_user_call_emits_call_with_mangled_id() {
        let templates = generate(
            "int add(int a, int b) { return a + b; }
             void main() { print(add(2, 3)); }",
        );
        let main = find(&templates, "main");
        assert!(
            main.instructions
                .contains(&Instruction::Call("add_int_int".to_string()))
        );
    }

    #[test]
    fn test_greater_than_swaps_operands() {
        // a > b compiles as: push b, push a, CMPLT
        let templates = generate("void main() { int a = 1; int b = 2; bool c = a > b; }");
        let main = find(&templates, "main");
        let pos = main
            .instructions
            .iter()
            .position(|i| *i == Instruction::CmpLt)
            .expect("CMPLT emitted");
        assert_eq!(main.instructions[pos - 2], Instruction::Load(1));
        assert_eq!(main.instructions[pos - 1], Instruction::Load(0));
    }

    #[test]
    fn test_no_greater_opcodes_emitted() {
        let templates = generate("void main() { bool a = 1 > 2; bool b = 1 >= 2; }");
        let main = find(&templates, "main");
        assert_eq!(
            main.instructions
                .iter()
                .filter(|i| matches!(i, Instruction::CmpLt | Instruction::CmpLe))
                .count(),
            2
        );
    }

    #[test]
    fn test_while_back_patches_to_nop() {
        let templates = generate("void main() { while (true) { print(1); } }");
        let main = find(&templates, "main");
        let exit = main
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::JmpF(t) => Some(*t),
                _ => None,
            })
            .expect("JMPF emitted");
        assert_eq!(main.instructions[exit], Instruction::Nop);
        // The back edge targets the condition at index 0.
        assert!(main.instructions.contains(&Instruction::Jmp(0)));
    }

    #[test]
    fn test_if_cascade_jumps_to_shared_landing_pad() {
        let templates = generate(
            "void main() {
               if (true) { print(1); }
               elseif (false) { print(2); }
               else { print(3); }
             }",
        );
        let main = find(&templates, "main");
        let landing = main
            .instructions
            .iter()
            .position(|i| *i == Instruction::Nop)
            .expect("NOP landing pad");
        let end_jumps: Vec<usize> = main
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Jmp(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(end_jumps, vec![landing, landing]);
    }

    #[test]
    fn test_struct_construction_sets_fields_positionally() {
        let templates = generate(
            "struct P { int x; int y; }
             void main() { P p = new P(7, 9); }",
        );
        let main = find(&templates, "main");
        let expected = [
            Instruction::AllocS,
            Instruction::Dup,
            Instruction::Push(Value::Int(7)),
            Instruction::SetF("x".to_string()),
            Instruction::Dup,
            Instruction::Push(Value::Int(9)),
            Instruction::SetF("y".to_string()),
            Instruction::Store(0),
        ];
        assert_eq!(&main.instructions[..expected.len()], &expected);
    }

    #[test]
    fn test_indexed_assignment() {
        let templates = generate(
            "void main() { array int a = new int[3]; a[0] = 1; }",
        );
        let main = find(&templates, "main");
        let seti = main
            .instructions
            .iter()
            .position(|i| *i == Instruction::SetI)
            .expect("SETI emitted");
        assert_eq!(main.instructions[seti - 3], Instruction::Load(0));
        assert_eq!(main.instructions[seti - 2], Instruction::Push(Value::Int(0)));
        assert_eq!(main.instructions[seti - 1], Instruction::Push(Value::Int(1)));
    }

    #[test]
    fn test_pathed_assignment_walks_fields() {
        let templates = generate(
            "struct Inner { int v; }
             struct Outer { Inner inner; }
             void main() {
               Outer o = new Outer(new Inner(1));
               o.inner.v = 5;
             }",
        );
        let main = find(&templates, "main");
        let setf_v = main
            .instructions
            .iter()
            .position(|i| *i == Instruction::SetF("v".to_string()))
            .expect("terminal SETF");
        assert!(
            main.instructions[..setf_v].contains(&Instruction::GetF("inner".to_string()))
        );
    }

    #[test]
    fn test_slot_indices_are_dense() {
        let templates = generate(
            "int f(int a, string b) {
               int c = 1;
               while (c < 10) { int d = c; c = d + 1; }
               for (int i = 0; i < 3; i = i + 1) { int e = i; }
               return c;
             }
             void main() { print(f(1, \"x\")); }",
        );
        for template in &templates {
            let mut slots: Vec<usize> = template
                .instructions
                .iter()
                .filter_map(|i| match i {
                    Instruction::Store(k) | Instruction::Load(k) => Some(*k),
                    _ => None,
                })
                .collect();
            slots.sort_unstable();
            slots.dedup();
            let expected: Vec<usize> = (0..slots.len()).collect();
            assert_eq!(slots, expected, "sparse slots in {}", template.function_id);
        }
    }

    #[test]
    fn test_scoped_names_reuse_is_fresh_slot() {
        // The same name in two sibling scopes gets two distinct slots.
        let templates = generate(
            "void main() {
               if (true) { int x = 1; print(x); } else { int x = 2; print(x); }
             }",
        );
        let main = find(&templates, "main");
        let stored: HashSet<usize> = main
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Store(k) => Some(*k),
                _ => None,
            })
            .collect();
        assert!(stored.contains(&0) && stored.contains(&1));
    }

    #[test]
    fn test_uninitialized_declaration_pushes_null() {
        let templates = generate("void main() { int x; }");
        let main = find(&templates, "main");
        assert_eq!(main.instructions[0], Instruction::Push(Value::Null));
        assert_eq!(main.instructions[1], Instruction::Store(0));
    }

    #[test]
    fn test_statement_call_to_void_function() {
        let templates = generate(
            "void helper() { print(1); }
             void main() { helper(); }",
        );
        let main = find(&templates, "main");
        assert!(main.instructions.contains(&Instruction::Call("helper".to_string())));
    }
}
