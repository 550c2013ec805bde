//! Recursive-descent parser for Opal
//!
//! A straight LL(1) parser with single-token lookahead. Each grammar rule is
//! one method; alternatives commit on their first sets, and a mismatch
//! raises a `ParserError` naming the expected construct together with the
//! offending lexeme and its origin. Comment tokens are skipped on every
//! advance.
//!
//! Binary operators are right-associative as written: the parser nests each
//! tail under the previous operator and later stages never re-associate, so
//! grouping is expressed with parentheses.

use crate::ast::{
    AssignStmt, BasicIf, CallExpr, DataType, Expr, ExprTerm, ForStmt, FunDef, IfStmt,
    NewAllocation, NewRValue, Program, RValue, ReturnStmt, Stmt, StructDef, VarDecl, VarDef,
    VarRValue, VarRef, WhileStmt,
};
use crate::error::{CompileError, ParserError};
use crate::lexer::Lexer;
use crate::token::{Token, TokenType};

/// First set of `data_type` (and of struct fields / params).
const TYPE_FIRST: [TokenType; 6] = [
    TokenType::IntType,
    TokenType::DoubleType,
    TokenType::BoolType,
    TokenType::StringType,
    TokenType::Id,
    TokenType::Array,
];

const BASE_TYPE_FIRST: [TokenType; 4] = [
    TokenType::IntType,
    TokenType::DoubleType,
    TokenType::BoolType,
    TokenType::StringType,
];

/// First set of `stmt`.
const STMT_FIRST: [TokenType; 10] = [
    TokenType::While,
    TokenType::If,
    TokenType::For,
    TokenType::Return,
    TokenType::IntType,
    TokenType::DoubleType,
    TokenType::BoolType,
    TokenType::StringType,
    TokenType::Array,
    TokenType::Id,
];

/// First set of `expr`.
const EXPR_FIRST: [TokenType; 9] = [
    TokenType::IntVal,
    TokenType::DoubleVal,
    TokenType::BoolVal,
    TokenType::StringVal,
    TokenType::NullVal,
    TokenType::New,
    TokenType::Id,
    TokenType::Not,
    TokenType::LParen,
];

/// First set of `rvalue` (expr minus `not` and parentheses).
const RVALUE_FIRST: [TokenType; 7] = [
    TokenType::IntVal,
    TokenType::DoubleVal,
    TokenType::BoolVal,
    TokenType::StringVal,
    TokenType::NullVal,
    TokenType::New,
    TokenType::Id,
];

const BIN_OPS: [TokenType; 12] = [
    TokenType::Plus,
    TokenType::Minus,
    TokenType::Times,
    TokenType::Divide,
    TokenType::And,
    TokenType::Or,
    TokenType::Equal,
    TokenType::NotEqual,
    TokenType::Less,
    TokenType::LessEq,
    TokenType::Greater,
    TokenType::GreaterEq,
];

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    curr_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Parser {
            lexer,
            // Replaced by the first advance() in parse().
            curr_token: Token::new(TokenType::Eos, "", 0, 0),
        }
    }

    /// Parse a whole program: struct and function definitions up to
    /// end-of-stream.
    pub fn parse(mut self) -> Result<Program, CompileError> {
        let mut program = Program::default();
        self.advance()?;
        while !self.check(TokenType::Eos) {
            if self.check(TokenType::Struct) {
                program.struct_defs.push(self.struct_def()?);
            } else {
                program.fun_defs.push(self.fun_def()?);
            }
        }
        self.eat(TokenType::Eos, "expecting EOF")?;
        Ok(program)
    }

    //----------------------------------------------------------------------
    // Helper functions
    //----------------------------------------------------------------------

    fn error(&self, message: &str) -> CompileError {
        CompileError::Parser(ParserError::new(message, &self.curr_token))
    }

    /// Move to the next token, transparently skipping comment tokens.
    fn advance(&mut self) -> Result<(), CompileError> {
        self.curr_token = self.lexer.next_token()?;
        while self.curr_token.token_type == TokenType::Comment {
            self.curr_token = self.lexer.next_token()?;
        }
        Ok(())
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.curr_token.token_type == token_type
    }

    fn check_any(&self, token_types: &[TokenType]) -> bool {
        token_types.contains(&self.curr_token.token_type)
    }

    /// Advance past the current token if it matches, otherwise raise a
    /// parser error with the given expectation.
    fn eat(&mut self, token_type: TokenType, message: &str) -> Result<(), CompileError> {
        if !self.check(token_type) {
            return Err(self.error(message));
        }
        self.advance()
    }

    /// Consume and return the current token after checking its type.
    fn eat_token(&mut self, token_type: TokenType, message: &str) -> Result<Token, CompileError> {
        if !self.check(token_type) {
            return Err(self.error(message));
        }
        let token = self.curr_token.clone();
        self.advance()?;
        Ok(token)
    }

    fn is_bin_op(&self) -> bool {
        self.check_any(&BIN_OPS)
    }

    //----------------------------------------------------------------------
    // Recursive descent functions
    //----------------------------------------------------------------------

    /// struct_def := STRUCT ID LBRACE fields RBRACE
    fn struct_def(&mut self) -> Result<StructDef, CompileError> {
        self.eat(TokenType::Struct, "expecting 'struct' in struct_def")?;
        let struct_name = self.eat_token(TokenType::Id, "expecting ID in struct_def")?;
        self.eat(TokenType::LBrace, "expecting '{' in struct_def")?;
        let fields = self.fields()?;
        self.eat(TokenType::RBrace, "expecting '}' in struct_def")?;
        Ok(StructDef {
            struct_name,
            fields,
        })
    }

    /// fields := (data_type ID SEMICOLON)*
    fn fields(&mut self) -> Result<Vec<VarDef>, CompileError> {
        let mut fields = Vec::new();
        while self.check_any(&TYPE_FIRST) {
            let data_type = self.data_type()?;
            let var_name = self.eat_token(TokenType::Id, "expecting ID in fields")?;
            self.eat(TokenType::Semicolon, "expecting ';' in fields")?;
            fields.push(VarDef {
                data_type,
                var_name,
            });
        }
        Ok(fields)
    }

    /// fun_def := (data_type | VOID) ID LPAREN params RPAREN LBRACE stmt* RBRACE
    fn fun_def(&mut self) -> Result<FunDef, CompileError> {
        let return_type = if self.check_any(&TYPE_FIRST) {
            self.data_type()?
        } else if self.check(TokenType::VoidType) {
            let token = self.curr_token.clone();
            self.advance()?;
            DataType::new(false, token)
        } else {
            return Err(self.error("expecting data_type or 'void' in fun_def"));
        };
        let fun_name = self.eat_token(TokenType::Id, "expecting ID in fun_def")?;
        self.eat(TokenType::LParen, "expecting '(' in fun_def")?;
        let params = self.params()?;
        self.eat(TokenType::RParen, "expecting ')' in fun_def")?;
        self.eat(TokenType::LBrace, "expecting '{' in fun_def")?;
        let stmts = self.stmt_block()?;
        self.eat(TokenType::RBrace, "expecting '}' in fun_def")?;
        Ok(FunDef {
            return_type,
            fun_name,
            params,
            stmts,
        })
    }

    /// params := (data_type ID (COMMA data_type ID)*)?
    fn params(&mut self) -> Result<Vec<VarDef>, CompileError> {
        let mut params = Vec::new();
        if self.check_any(&TYPE_FIRST) {
            loop {
                let data_type = self.data_type()?;
                let var_name = self.eat_token(TokenType::Id, "expecting ID in params")?;
                params.push(VarDef {
                    data_type,
                    var_name,
                });
                if !self.check(TokenType::Comma) {
                    break;
                }
                self.advance()?;
            }
        }
        Ok(params)
    }

    /// data_type := base_type | ID | ARRAY (base_type | ID)
    fn data_type(&mut self) -> Result<DataType, CompileError> {
        if self.check_any(&BASE_TYPE_FIRST) || self.check(TokenType::Id) {
            let type_name = self.curr_token.clone();
            self.advance()?;
            return Ok(DataType::new(false, type_name));
        }
        if self.check(TokenType::Array) {
            self.advance()?;
            if self.check_any(&BASE_TYPE_FIRST) || self.check(TokenType::Id) {
                let type_name = self.curr_token.clone();
                self.advance()?;
                return Ok(DataType::new(true, type_name));
            }
            return Err(self.error("expecting base_type or ID in data_type"));
        }
        Err(self.error("expecting base_type, ID, or 'array' in data_type"))
    }

    /// Zero or more statements, as long as the current token can start one.
    fn stmt_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        while self.check_any(&STMT_FIRST) {
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    /// stmt := while | if | for | return SEMI | vdecl SEMI
    ///       | ID (vdecl | assign | call) SEMI
    fn stmt(&mut self) -> Result<Stmt, CompileError> {
        match self.curr_token.token_type {
            TokenType::While => Ok(Stmt::While(self.while_stmt()?)),
            TokenType::If => Ok(Stmt::If(self.if_stmt()?)),
            TokenType::For => Ok(Stmt::For(self.for_stmt()?)),
            TokenType::Return => {
                let stmt = self.return_stmt()?;
                self.eat(TokenType::Semicolon, "expecting ';' in stmt")?;
                Ok(Stmt::Return(stmt))
            }
            TokenType::IntType
            | TokenType::DoubleType
            | TokenType::BoolType
            | TokenType::StringType
            | TokenType::Array => {
                let data_type = self.data_type()?;
                let decl = self.vdecl_stmt(data_type)?;
                self.eat(TokenType::Semicolon, "expecting ';' in stmt")?;
                Ok(Stmt::VarDecl(decl))
            }
            TokenType::Id => {
                // One token of lookahead decides between a struct-typed
                // declaration, an assignment, and a call.
                let id_token = self.curr_token.clone();
                self.advance()?;
                match self.curr_token.token_type {
                    TokenType::Id => {
                        let decl = self.vdecl_stmt(DataType::new(false, id_token))?;
                        self.eat(TokenType::Semicolon, "expecting ';' in stmt")?;
                        Ok(Stmt::VarDecl(decl))
                    }
                    TokenType::LBracket | TokenType::Dot | TokenType::Assign => {
                        let stmt = self.assign_stmt(id_token)?;
                        self.eat(TokenType::Semicolon, "expecting ';' in stmt")?;
                        Ok(Stmt::Assign(stmt))
                    }
                    TokenType::LParen => {
                        let call = self.call_expr(id_token)?;
                        self.eat(TokenType::Semicolon, "expecting ';' in stmt")?;
                        Ok(Stmt::Call(call))
                    }
                    _ => Err(self.error("expecting vdecl_stmt, assign_stmt, or call_expr in stmt")),
                }
            }
            _ => Err(self.error(
                "expecting while_stmt, if_stmt, for_stmt, return_stmt, vdecl_stmt, \
                 assign_stmt, or call_expr in stmt",
            )),
        }
    }

    /// vdecl_stmt := ID (ASSIGN expr)?   (the data_type is already consumed)
    fn vdecl_stmt(&mut self, data_type: DataType) -> Result<VarDecl, CompileError> {
        let var_name = self.eat_token(TokenType::Id, "expecting ID in vdecl_stmt")?;
        let expr = if self.check(TokenType::Assign) {
            self.advance()?;
            Some(self.expr()?)
        } else {
            None
        };
        Ok(VarDecl {
            var_def: VarDef {
                data_type,
                var_name,
            },
            expr,
        })
    }

    /// assign_stmt := lvalue ASSIGN expr   (the head ID is already consumed)
    fn assign_stmt(&mut self, head: Token) -> Result<AssignStmt, CompileError> {
        let lvalue = self.lvalue(head)?;
        self.eat(TokenType::Assign, "expecting '=' in assign_stmt")?;
        let expr = self.expr()?;
        Ok(AssignStmt { lvalue, expr })
    }

    /// lvalue := ID (LBRACKET expr RBRACKET)? (DOT ID (LBRACKET expr RBRACKET)?)*
    fn lvalue(&mut self, head: Token) -> Result<Vec<VarRef>, CompileError> {
        let mut path = vec![VarRef {
            var_name: head,
            array_expr: None,
        }];
        if self.check(TokenType::LBracket) {
            self.advance()?;
            path[0].array_expr = Some(Box::new(self.expr()?));
            self.eat(TokenType::RBracket, "expecting ']' in lvalue")?;
        }
        while self.check(TokenType::Dot) {
            self.advance()?;
            let var_name = self.eat_token(TokenType::Id, "expecting ID in lvalue")?;
            let array_expr = if self.check(TokenType::LBracket) {
                self.advance()?;
                let expr = self.expr()?;
                self.eat(TokenType::RBracket, "expecting ']' in lvalue")?;
                Some(Box::new(expr))
            } else {
                None
            };
            path.push(VarRef {
                var_name,
                array_expr,
            });
        }
        Ok(path)
    }

    /// if_stmt := IF LPAREN expr RPAREN LBRACE stmt* RBRACE if_stmt_t
    fn if_stmt(&mut self) -> Result<IfStmt, CompileError> {
        self.eat(TokenType::If, "expecting 'if' in if_stmt")?;
        let if_part = self.basic_if("if_stmt")?;
        let mut else_ifs = Vec::new();
        let mut else_stmts = Vec::new();
        loop {
            if self.check(TokenType::ElseIf) {
                self.advance()?;
                else_ifs.push(self.basic_if("if_stmt_t")?);
            } else if self.check(TokenType::Else) {
                self.advance()?;
                self.eat(TokenType::LBrace, "expecting '{' in if_stmt_t")?;
                else_stmts = self.stmt_block()?;
                self.eat(TokenType::RBrace, "expecting '}' in if_stmt_t")?;
                break;
            } else {
                break;
            }
        }
        Ok(IfStmt {
            if_part,
            else_ifs,
            else_stmts,
        })
    }

    /// A parenthesized condition plus a braced body; shared by `if` and
    /// `elseif`.
    fn basic_if(&mut self, rule: &str) -> Result<BasicIf, CompileError> {
        self.eat(TokenType::LParen, &format!("expecting '(' in {}", rule))?;
        let condition = self.expr()?;
        self.eat(TokenType::RParen, &format!("expecting ')' in {}", rule))?;
        self.eat(TokenType::LBrace, &format!("expecting '{{' in {}", rule))?;
        let stmts = self.stmt_block()?;
        self.eat(TokenType::RBrace, &format!("expecting '}}' in {}", rule))?;
        Ok(BasicIf { condition, stmts })
    }

    /// while_stmt := WHILE LPAREN expr RPAREN LBRACE stmt* RBRACE
    fn while_stmt(&mut self) -> Result<WhileStmt, CompileError> {
        self.eat(TokenType::While, "expecting 'while' in while_stmt")?;
        self.eat(TokenType::LParen, "expecting '(' in while_stmt")?;
        let condition = self.expr()?;
        self.eat(TokenType::RParen, "expecting ')' in while_stmt")?;
        self.eat(TokenType::LBrace, "expecting '{' in while_stmt")?;
        let stmts = self.stmt_block()?;
        self.eat(TokenType::RBrace, "expecting '}' in while_stmt")?;
        Ok(WhileStmt { condition, stmts })
    }

    /// for_stmt := FOR LPAREN data_type vdecl SEMI expr SEMI ID assign RPAREN
    ///             LBRACE stmt* RBRACE
    fn for_stmt(&mut self) -> Result<ForStmt, CompileError> {
        self.eat(TokenType::For, "expecting 'for' in for_stmt")?;
        self.eat(TokenType::LParen, "expecting '(' in for_stmt")?;
        let data_type = self.data_type()?;
        let var_decl = self.vdecl_stmt(data_type)?;
        self.eat(TokenType::Semicolon, "expecting ';' in for_stmt")?;
        let condition = self.expr()?;
        self.eat(TokenType::Semicolon, "expecting ';' in for_stmt")?;
        let head = self.eat_token(TokenType::Id, "expecting ID in for_stmt")?;
        let assign_stmt = self.assign_stmt(head)?;
        self.eat(TokenType::RParen, "expecting ')' in for_stmt")?;
        self.eat(TokenType::LBrace, "expecting '{' in for_stmt")?;
        let stmts = self.stmt_block()?;
        self.eat(TokenType::RBrace, "expecting '}' in for_stmt")?;
        Ok(ForStmt {
            var_decl,
            condition,
            assign_stmt,
            stmts,
        })
    }

    /// call_expr := LPAREN (expr (COMMA expr)*)? RPAREN   (name consumed)
    fn call_expr(&mut self, fun_name: Token) -> Result<CallExpr, CompileError> {
        self.eat(TokenType::LParen, "expecting '(' in call_expr")?;
        let mut args = Vec::new();
        if self.check_any(&EXPR_FIRST) {
            args.push(self.expr()?);
            while self.check(TokenType::Comma) {
                self.advance()?;
                args.push(self.expr()?);
            }
        }
        self.eat(TokenType::RParen, "expecting ')' in call_expr")?;
        Ok(CallExpr {
            fun_name,
            args,
            fun_id: None,
        })
    }

    /// return_stmt := RETURN expr
    fn return_stmt(&mut self) -> Result<ReturnStmt, CompileError> {
        self.eat(TokenType::Return, "expecting 'return' in return_stmt")?;
        let expr = self.expr()?;
        Ok(ReturnStmt { expr })
    }

    /// expr := (rvalue | NOT expr | LPAREN expr RPAREN) (bin_op expr)?
    ///
    /// The operator chain is built right-leaning: the tail after an operator
    /// is itself a full `expr`.
    fn expr(&mut self) -> Result<Expr, CompileError> {
        let mut not_op = false;
        while self.check(TokenType::Not) {
            self.advance()?;
            not_op = true;
        }
        let first = if self.check_any(&RVALUE_FIRST) {
            ExprTerm::Simple(self.rvalue()?)
        } else if self.check(TokenType::LParen) {
            self.advance()?;
            let inner = self.expr()?;
            self.eat(TokenType::RParen, "expecting ')' in expr")?;
            ExprTerm::Complex(Box::new(inner))
        } else {
            return Err(self.error("expecting rvalue, 'not', or '(' in expr"));
        };
        let (op, rest) = if self.is_bin_op() {
            let op = self.curr_token.clone();
            self.advance()?;
            (Some(op), Some(Box::new(self.expr()?)))
        } else {
            (None, None)
        };
        Ok(Expr {
            not_op,
            first,
            op,
            rest,
        })
    }

    /// rvalue := base_rvalue | NULL | new_rvalue | ID (call_expr | var_rvalue)
    fn rvalue(&mut self) -> Result<RValue, CompileError> {
        match self.curr_token.token_type {
            TokenType::IntVal
            | TokenType::DoubleVal
            | TokenType::BoolVal
            | TokenType::StringVal
            | TokenType::NullVal => {
                let token = self.curr_token.clone();
                self.advance()?;
                Ok(RValue::Simple(token))
            }
            TokenType::New => Ok(RValue::New(self.new_rvalue()?)),
            TokenType::Id => {
                let id_token = self.curr_token.clone();
                self.advance()?;
                if self.check(TokenType::LParen) {
                    Ok(RValue::Call(self.call_expr(id_token)?))
                } else {
                    Ok(RValue::Var(self.var_rvalue(id_token)?))
                }
            }
            _ => Err(self.error("expecting base_rvalue, 'null', new_rvalue, or ID in rvalue")),
        }
    }

    /// new_rvalue := NEW base_type LBRACKET expr RBRACKET
    ///             | NEW ID (LPAREN (expr (COMMA expr)*)? RPAREN
    ///                      | LBRACKET expr RBRACKET)
    fn new_rvalue(&mut self) -> Result<NewRValue, CompileError> {
        self.eat(TokenType::New, "expecting 'new' in new_rvalue")?;
        if self.check_any(&BASE_TYPE_FIRST) {
            let type_name = self.curr_token.clone();
            self.advance()?;
            self.eat(TokenType::LBracket, "expecting '[' in new_rvalue")?;
            let size = self.expr()?;
            self.eat(TokenType::RBracket, "expecting ']' in new_rvalue")?;
            return Ok(NewRValue {
                type_name,
                allocation: NewAllocation::Array(Box::new(size)),
            });
        }
        if self.check(TokenType::Id) {
            let type_name = self.curr_token.clone();
            self.advance()?;
            if self.check(TokenType::LParen) {
                self.advance()?;
                let mut struct_params = Vec::new();
                if self.check_any(&EXPR_FIRST) {
                    struct_params.push(self.expr()?);
                    while self.check(TokenType::Comma) {
                        self.advance()?;
                        struct_params.push(self.expr()?);
                    }
                }
                self.eat(TokenType::RParen, "expecting ')' in new_rvalue")?;
                return Ok(NewRValue {
                    type_name,
                    allocation: NewAllocation::Struct(struct_params),
                });
            }
            if self.check(TokenType::LBracket) {
                self.advance()?;
                let size = self.expr()?;
                self.eat(TokenType::RBracket, "expecting ']' in new_rvalue")?;
                return Ok(NewRValue {
                    type_name,
                    allocation: NewAllocation::Array(Box::new(size)),
                });
            }
            return Err(self.error("expecting '(' or '[' in new_rvalue"));
        }
        Err(self.error("expecting ID or base_type in new_rvalue"))
    }

    /// var_rvalue := ID (LBRACKET expr RBRACKET)?
    ///               (DOT ID (LBRACKET expr RBRACKET)?)*   (head consumed)
    fn var_rvalue(&mut self, head: Token) -> Result<VarRValue, CompileError> {
        let mut path = vec![VarRef {
            var_name: head,
            array_expr: None,
        }];
        if self.check(TokenType::LBracket) {
            self.advance()?;
            path[0].array_expr = Some(Box::new(self.expr()?));
            self.eat(TokenType::RBracket, "expecting ']' in var_rvalue")?;
        }
        while self.check(TokenType::Dot) {
            self.advance()?;
            let var_name = self.eat_token(TokenType::Id, "expecting ID in var_rvalue")?;
            let array_expr = if self.check(TokenType::LBracket) {
                self.advance()?;
                let expr = self.expr()?;
                self.eat(TokenType::RBracket, "expecting ']' in var_rvalue")?;
                Some(Box::new(expr))
            } else {
                None
            };
            path.push(VarRef {
                var_name,
                array_expr,
            });
        }
        Ok(VarRValue { path })
    }
}

/// Lex and parse a source string in one step.
pub fn parse_source(source: &str) -> Result<Program, CompileError> {
    Parser::new(Lexer::new(source)).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_program() {
        let program = parse_source("").unwrap();
        assert!(program.struct_defs.is_empty());
        assert!(program.fun_defs.is_empty());
    }

    #[test]
    fn test_hello_world() {
        let program = parse_source("void main() { print(\"hi\"); }").unwrap();
        assert_eq!(program.fun_defs.len(), 1);
        let main = &program.fun_defs[0];
        assert_eq!(main.fun_name.lexeme, "main");
        assert_eq!(main.return_type.name(), "void");
        assert!(main.params.is_empty());
        assert_eq!(main.stmts.len(), 1);
        match &main.stmts[0] {
            Stmt::Call(call) => {
                assert_eq!(call.fun_name.lexeme, "print");
                assert_eq!(call.args.len(), 1);
                assert!(call.fun_id.is_none());
            }
            other => panic!("expected call statement, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_def() {
        let program = parse_source("struct P { int x; array double ys; }").unwrap();
        assert_eq!(program.struct_defs.len(), 1);
        let p = &program.struct_defs[0];
        assert_eq!(p.struct_name.lexeme, "P");
        assert_eq!(p.fields.len(), 2);
        assert_eq!(p.fields[0].var_name.lexeme, "x");
        assert!(!p.fields[0].data_type.is_array);
        assert!(p.fields[1].data_type.is_array);
        assert_eq!(p.fields[1].data_type.name(), "double");
    }

    #[test]
    fn test_zero_field_struct() {
        let program = parse_source("struct Empty { }").unwrap();
        assert!(program.struct_defs[0].fields.is_empty());
    }

    #[test]
    fn test_params() {
        let program = parse_source("int add(int a, int b) { return a + b; }").unwrap();
        let fun = &program.fun_defs[0];
        assert_eq!(fun.params.len(), 2);
        assert_eq!(fun.params[0].var_name.lexeme, "a");
        assert_eq!(fun.mangled_id(), "add_int_int");
    }

    #[test]
    fn test_expr_is_right_associative() {
        // 1 - 2 - 3 parses as 1 - (2 - 3)
        let program = parse_source("void main() { int x = 1 - 2 - 3; }").unwrap();
        let Stmt::VarDecl(decl) = &program.fun_defs[0].stmts[0] else {
            panic!("expected declaration");
        };
        let expr = decl.expr.as_ref().unwrap();
        assert_eq!(expr.op.as_ref().unwrap().lexeme, "-");
        let rest = expr.rest.as_ref().unwrap();
        assert_eq!(rest.op.as_ref().unwrap().lexeme, "-");
        assert!(rest.rest.as_ref().unwrap().op.is_none());
    }

    #[test]
    fn test_parenthesized_expr_is_complex_term() {
        let program = parse_source("void main() { int x = (1 - 2) - 3; }").unwrap();
        let Stmt::VarDecl(decl) = &program.fun_defs[0].stmts[0] else {
            panic!("expected declaration");
        };
        let expr = decl.expr.as_ref().unwrap();
        assert!(matches!(expr.first, ExprTerm::Complex(_)));
        assert_eq!(expr.op.as_ref().unwrap().lexeme, "-");
    }

    #[test]
    fn test_not_expr() {
        let program = parse_source("void main() { bool b = not true; }").unwrap();
        let Stmt::VarDecl(decl) = &program.fun_defs[0].stmts[0] else {
            panic!("expected declaration");
        };
        assert!(decl.expr.as_ref().unwrap().not_op);
    }

    #[test]
    fn test_new_forms() {
        let program =
            parse_source("void main() { array int a = new int[3]; P p = new P(1, 2); }").unwrap();
        let Stmt::VarDecl(decl) = &program.fun_defs[0].stmts[0] else {
            panic!("expected declaration");
        };
        let Some(Expr {
            first: ExprTerm::Simple(RValue::New(new_rvalue)),
            ..
        }) = decl.expr.as_ref()
        else {
            panic!("expected new rvalue");
        };
        assert!(matches!(new_rvalue.allocation, NewAllocation::Array(_)));

        let Stmt::VarDecl(decl) = &program.fun_defs[0].stmts[1] else {
            panic!("expected declaration");
        };
        let Some(Expr {
            first: ExprTerm::Simple(RValue::New(new_rvalue)),
            ..
        }) = decl.expr.as_ref()
        else {
            panic!("expected new rvalue");
        };
        match &new_rvalue.allocation {
            NewAllocation::Struct(params) => assert_eq!(params.len(), 2),
            other => panic!("expected struct allocation, got {:?}", other),
        }
    }

    #[test]
    fn test_lvalue_path() {
        let program = parse_source("void main() { a[0].b.c[i] = 5; }").unwrap();
        let Stmt::Assign(assign) = &program.fun_defs[0].stmts[0] else {
            panic!("expected assignment");
        };
        assert_eq!(assign.lvalue.len(), 3);
        assert!(assign.lvalue[0].array_expr.is_some());
        assert!(assign.lvalue[1].array_expr.is_none());
        assert!(assign.lvalue[2].array_expr.is_some());
    }

    #[test]
    fn test_struct_typed_declaration() {
        let program = parse_source("void main() { Node n = null; }").unwrap();
        let Stmt::VarDecl(decl) = &program.fun_defs[0].stmts[0] else {
            panic!("expected declaration");
        };
        assert_eq!(decl.var_def.data_type.name(), "Node");
    }

    #[test]
    fn test_if_elseif_else() {
        let source = "void main() {
            if (a) { x = 1; }
            elseif (b) { x = 2; }
            elseif (c) { x = 3; }
            else { x = 4; }
        }";
        let program = parse_source(source).unwrap();
        let Stmt::If(if_stmt) = &program.fun_defs[0].stmts[0] else {
            panic!("expected if");
        };
        assert_eq!(if_stmt.else_ifs.len(), 2);
        assert_eq!(if_stmt.else_stmts.len(), 1);
    }

    #[test]
    fn test_for_stmt() {
        let source = "void main() { for (int i = 0; i < 3; i = i + 1) { print(i); } }";
        let program = parse_source(source).unwrap();
        let Stmt::For(for_stmt) = &program.fun_defs[0].stmts[0] else {
            panic!("expected for");
        };
        assert_eq!(for_stmt.var_decl.var_def.var_name.lexeme, "i");
        assert_eq!(for_stmt.assign_stmt.lvalue[0].var_name.lexeme, "i");
        assert_eq!(for_stmt.stmts.len(), 1);
    }

    #[test]
    fn test_while_stmt() {
        let source = "void main() { while (i < 3) { i = i + 1; } }";
        let program = parse_source(source).unwrap();
        assert!(matches!(program.fun_defs[0].stmts[0], Stmt::While(_)));
    }

    #[test]
    fn test_comments_skipped() {
        let source = "// leading comment\nvoid main() { // inline\n }";
        let program = parse_source(source).unwrap();
        assert_eq!(program.fun_defs.len(), 1);
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse_source("void main() { int x = 1 }").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("';'"), "unexpected message: {}", text);
        assert!(text.contains("\"}\""), "unexpected message: {}", text);
    }

    #[test]
    fn test_unexpected_top_level_token() {
        let err = parse_source(";").unwrap_err();
        assert!(err.to_string().contains("fun_def"));
    }

    #[test]
    fn test_error_carries_position() {
        let err = parse_source("void main() {\n  int = 1;\n}").unwrap_err();
        let CompileError::Parser(parser_err) = err else {
            panic!("expected parser error");
        };
        assert_eq!(parser_err.line, 2);
        assert_eq!(parser_err.lexeme, "=");
    }

    #[test]
    fn test_lexer_error_surfaces() {
        let err = parse_source("void main() { int x = 07; }").unwrap_err();
        assert!(matches!(err, CompileError::Lexer(_)));
    }

    #[test]
    fn test_call_with_no_args() {
        let program = parse_source("void main() { string s = input(); }").unwrap();
        let Stmt::VarDecl(decl) = &program.fun_defs[0].stmts[0] else {
            panic!("expected declaration");
        };
        let Some(Expr {
            first: ExprTerm::Simple(RValue::Call(call)),
            ..
        }) = decl.expr.as_ref()
        else {
            panic!("expected call rvalue");
        };
        assert!(call.args.is_empty());
    }
}
