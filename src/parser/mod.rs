//! Recursive-descent statement parser wrapping a Pratt-style
//! operator-precedence expression parser (spec.md §4.3).

pub mod error;
pub mod precedence;

use std::rc::Rc;

use crate::ast::{CatchClause, Constant, Node, OpKind, Param};
use crate::lexer::token::{Position, Span, Token, TokenKind};

pub use error::ParseError;

pub type PResult<T> = Result<T, ParseError>;

/// Tokenizes and parses `source` in one step.
pub fn parse(source: &str) -> PResult<Node> {
    let tokens = crate::lexer::tokenize(source)?;
    Parser::new(tokens).parse_program()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
            self.skip_separators();
        }
        let end = self.prev_end(start);
        Ok(Node::Program(stmts, Span { start, end }))
    }

    // --- token stream primitives -------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn prev_end(&self, fallback: Position) -> Position {
        if self.pos == 0 {
            fallback
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if !tok.is_eof() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::unexpected(self.peek_kind(), what, self.peek().span))
        }
    }

    fn expect_ident(&mut self) -> PResult<Rc<str>> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::unexpected(&other, "an identifier", self.peek().span)),
        }
    }

    /// Statements may be separated by newlines or `;`; both are skipped
    /// freely between statements.
    fn skip_separators(&mut self) {
        while self.check(&TokenKind::Newline) || self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Inside brackets/parens an expression may continue across a line break.
    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof | TokenKind::RBrace
        )
    }

    // --- statements ----------------------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Node> {
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Ret => self.parse_ret(),
            TokenKind::Throw => self.parse_throw(),
            TokenKind::Assert => self.parse_assert(),
            TokenKind::Break => {
                let span = self.advance().span;
                Ok(Node::Break(span))
            }
            TokenKind::Cont => {
                let span = self.advance().span;
                Ok(Node::Cont(span))
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::Func => self.parse_func_def(),
            TokenKind::Type => self.parse_type_def(),
            TokenKind::Enum => self.parse_enum_def(),
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_block(&mut self) -> PResult<Node> {
        let start = self.expect(&TokenKind::LBrace, "`{`")?.span.start;
        self.skip_separators();
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
            self.skip_separators();
        }
        let end = self.expect(&TokenKind::RBrace, "`}`")?.span.end;
        Ok(Node::Block(stmts, Span { start, end }))
    }

    fn parse_if(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `if`
        let cond = Box::new(self.parse_expression()?);
        let then_branch = Box::new(self.parse_block()?);
        let else_branch = self.parse_else_or_elif()?;
        let end = self.prev_end(start);
        Ok(Node::If {
            cond,
            then_branch,
            else_branch,
            span: Span { start, end },
        })
    }

    /// `elif` folds into the else branch as a nested `if` (spec.md §4.3).
    fn parse_else_or_elif(&mut self) -> PResult<Option<Box<Node>>> {
        if self.check(&TokenKind::Elif) {
            let start = self.advance().span.start;
            let cond = Box::new(self.parse_expression()?);
            let then_branch = Box::new(self.parse_block()?);
            let else_branch = self.parse_else_or_elif()?;
            let end = self.prev_end(start);
            Ok(Some(Box::new(Node::If {
                cond,
                then_branch,
                else_branch,
                span: Span { start, end },
            })))
        } else if self.check(&TokenKind::Else) {
            self.advance();
            Ok(Some(Box::new(self.parse_block()?)))
        } else {
            Ok(None)
        }
    }

    fn parse_while(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `while`
        let cond = Box::new(self.parse_expression()?);
        let body = Box::new(self.parse_block()?);
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        let end = self.prev_end(start);
        Ok(Node::While {
            cond,
            body,
            else_branch,
            span: Span { start, end },
        })
    }

    fn parse_for(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `for`
        let target = self.expect_ident()?;
        self.expect(&TokenKind::In, "`in`")?;
        let iter = Box::new(self.parse_expression()?);
        let body = Box::new(self.parse_block()?);
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        let end = self.prev_end(start);
        Ok(Node::For {
            target,
            iter,
            body,
            else_branch,
            span: Span { start, end },
        })
    }

    fn parse_try(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `try`
        let body = Box::new(self.parse_block()?);
        let mut catches = Vec::new();
        while self.check(&TokenKind::Catch) {
            catches.push(self.parse_catch_clause()?);
        }
        let finally = if self.check(&TokenKind::Finally) {
            self.advance();
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        let end = self.prev_end(start);
        Ok(Node::Try {
            body,
            catches,
            finally,
            span: Span { start, end },
        })
    }

    /// `catch { ... }` catches everything; `catch e { ... }` catches
    /// everything and binds the exception to `e`; `catch T as e { ... }` (or
    /// a tuple `catch (T1, T2) as e { ... }`) matches specific types.
    fn parse_catch_clause(&mut self) -> PResult<CatchClause> {
        self.advance(); // `catch`
        let mut exc_types = Vec::new();
        let mut binding = None;
        if !self.check(&TokenKind::LBrace) {
            let first = self.parse_expression()?;
            if self.check(&TokenKind::As) {
                self.advance();
                binding = Some(self.expect_ident()?);
                exc_types.push(first);
            } else if let Node::Name(name, _) = &first {
                binding = Some(Rc::clone(name));
            } else {
                exc_types.push(first);
            }
        }
        let body = Box::new(self.parse_block()?);
        Ok(CatchClause {
            exc_types,
            binding,
            body,
        })
    }

    fn parse_ret(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `ret`
        let value = if self.at_statement_end() {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let end = self.prev_end(start);
        Ok(Node::Ret(value, Span { start, end }))
    }

    fn parse_throw(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `throw`
        let value = Box::new(self.parse_expression()?);
        let end = self.prev_end(start);
        Ok(Node::Throw(value, Span { start, end }))
    }

    fn parse_assert(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `assert`
        let cond = Box::new(self.parse_expression()?);
        let msg = if self.check(&TokenKind::Comma) {
            self.advance();
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        let end = self.prev_end(start);
        Ok(Node::Assert(cond, msg, Span { start, end }))
    }

    fn parse_import(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `import`
        let mut path = self.expect_ident()?.to_string();
        while self.check(&TokenKind::Dot) {
            self.advance();
            path.push('.');
            path.push_str(&self.expect_ident()?);
        }
        let alias = if self.check(&TokenKind::As) {
            self.advance();
            Some(self.expect_ident()?)
        } else {
            None
        };
        let end = self.prev_end(start);
        Ok(Node::Import(Rc::from(path.as_str()), alias, Span { start, end }))
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(&TokenKind::LParen, "`(`")?;
        self.skip_newlines();
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let variadic = if self.check(&TokenKind::Star) {
                self.advance();
                true
            } else {
                false
            };
            let name = self.expect_ident()?;
            let default = if self.check(&TokenKind::Assign) {
                self.advance();
                Some(Box::new(self.parse_expression()?))
            } else {
                None
            };
            params.push(Param { name, default, variadic });
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(params)
    }

    fn parse_func_def(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `func`
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        let body = Box::new(self.parse_block()?);
        let end = self.prev_end(start);
        Ok(Node::FuncDef {
            name,
            params,
            body,
            docstring: None,
            span: Span { start, end },
        })
    }

    fn parse_type_def(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `type`
        let name = self.expect_ident()?;
        let base = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(Box::new(self.parse_postfix()?))
        } else {
            None
        };
        let body = Box::new(self.parse_block()?);
        let end = self.prev_end(start);
        Ok(Node::TypeDef {
            name,
            base,
            body,
            span: Span { start, end },
        })
    }

    fn parse_enum_def(&mut self) -> PResult<Node> {
        let start = self.advance().span.start; // `enum`
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        self.skip_separators();
        let mut variants = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            variants.push(self.expect_ident()?);
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_separators();
            } else {
                break;
            }
        }
        self.skip_separators();
        let end = self.expect(&TokenKind::RBrace, "`}`")?.span.end;
        Ok(Node::EnumDef {
            name,
            variants,
            span: Span { start, end },
        })
    }

    fn parse_expr_statement(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let expr = self.parse_expression()?;
        let end = self.prev_end(start);
        match expr {
            Node::Assign { .. } => Ok(expr),
            other => Ok(Node::ExprStmt(Box::new(other), Span { start, end })),
        }
    }

    // --- expressions: augmented assignment (lowest) down to postfix (highest) -----

    pub fn parse_expression(&mut self) -> PResult<Node> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let target = self.parse_conditional()?;
        if let Some(op) = precedence::assignment_op(self.peek_kind()) {
            self.advance();
            self.skip_newlines();
            let value = Box::new(self.parse_assignment()?);
            let end = self.prev_end(start);
            return Ok(Node::Assign {
                target: Box::new(target),
                op,
                value,
                span: Span { start, end },
            });
        }
        Ok(target)
    }

    fn parse_conditional(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let then_branch = self.parse_coalesce()?;
        if self.check(&TokenKind::If) {
            self.advance();
            let cond = Box::new(self.parse_coalesce()?);
            self.expect(&TokenKind::Else, "`else`")?;
            let else_branch = Box::new(self.parse_conditional()?);
            let end = self.prev_end(start);
            return Ok(Node::Conditional {
                cond,
                then_branch: Box::new(then_branch),
                else_branch,
                span: Span { start, end },
            });
        }
        Ok(then_branch)
    }

    fn parse_coalesce(&mut self) -> PResult<Node> {
        self.parse_left_assoc_chain(Self::parse_logical_or, &[TokenKind::QuesQues])
    }

    fn parse_logical_or(&mut self) -> PResult<Node> {
        self.parse_left_assoc_chain(Self::parse_logical_and, &[TokenKind::OrOr])
    }

    fn parse_logical_and(&mut self) -> PResult<Node> {
        self.parse_left_assoc_chain(Self::parse_compare, &[TokenKind::AndAnd])
    }

    fn parse_left_assoc_chain(
        &mut self,
        mut next: impl FnMut(&mut Self) -> PResult<Node>,
        tokens: &[TokenKind],
    ) -> PResult<Node> {
        let start = self.peek().span.start;
        let mut left = next(self)?;
        while tokens.iter().any(|t| self.check(t)) {
            let (op, _, _) = precedence::binary_op(self.peek_kind()).expect("known operator token");
            self.advance();
            self.skip_newlines();
            let right = next(self)?;
            let end = self.prev_end(start);
            left = Node::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span: Span { start, end },
            };
        }
        Ok(left)
    }

    /// Chained comparisons (`a < b <= c`) collapse into one `RichCompare`
    /// node (spec.md §4.3).
    fn parse_compare(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let first = self.parse_climb(precedence::BIT_OR)?;
        let mut ops = Vec::new();
        let mut operands = vec![first];
        while precedence::is_comparison_token(self.peek_kind()) {
            let (op, _, _) = precedence::binary_op(self.peek_kind()).unwrap();
            self.advance();
            self.skip_newlines();
            ops.push(op);
            operands.push(self.parse_climb(precedence::BIT_OR)?);
        }
        if ops.is_empty() {
            Ok(operands.pop().unwrap())
        } else {
            let end = self.prev_end(start);
            Ok(Node::RichCompare {
                ops,
                operands,
                span: Span { start, end },
            })
        }
    }

    /// Precedence climbing over everything between bitwise-or and
    /// multiplicative (power and unary are handled by `parse_unary`).
    fn parse_climb(&mut self, min_prec: precedence::Precedence) -> PResult<Node> {
        let start = self.peek().span.start;
        let mut left = self.parse_unary()?;
        loop {
            let Some((op, prec, right_assoc)) = precedence::binary_op(self.peek_kind()) else {
                break;
            };
            if op.is_comparison() || prec < min_prec {
                break;
            }
            self.advance();
            self.skip_newlines();
            let next_min = if right_assoc {
                prec
            } else {
                precedence::Precedence(prec.0 + 1)
            };
            let right = self.parse_climb(next_min)?;
            let end = self.prev_end(start);
            left = Node::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span: Span { start, end },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let op = match self.peek_kind() {
            TokenKind::Plus => Some(OpKind::Pos),
            TokenKind::Minus => Some(OpKind::Neg),
            TokenKind::Tilde => Some(OpKind::BitNot),
            TokenKind::Bang => Some(OpKind::Not),
            TokenKind::PlusPlus => Some(OpKind::PreIncr),
            TokenKind::MinusMinus => Some(OpKind::PreDecr),
            TokenKind::Star => Some(OpKind::Splat),
            TokenKind::Question => Some(OpKind::Maybe),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = Box::new(self.parse_unary()?);
            let end = self.prev_end(start);
            return Ok(Node::UnaryOp {
                op,
                operand,
                span: Span { start, end },
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::StarStar) {
            self.advance();
            self.skip_newlines();
            let exp = Box::new(self.parse_unary()?);
            let end = self.prev_end(start);
            return Ok(Node::BinaryOp {
                op: OpKind::Pow,
                left: Box::new(base),
                right: exp,
                span: Span { start, end },
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let mut node = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    let end = self.prev_end(start);
                    node = Node::Attribute {
                        target: Box::new(node),
                        name,
                        span: Span { start, end },
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.skip_newlines();
                    let indices = self.parse_index_list()?;
                    self.skip_newlines();
                    self.expect(&TokenKind::RBracket, "`]`")?;
                    let end = self.prev_end(start);
                    // A bare slice (`a[1:2]`) and a multi-index subscript
                    // (`a[i, j]`) both end up as `Element` with one or more
                    // `indices` entries; the compiler tells them apart by
                    // inspecting whether the single entry is a `Slice` node.
                    node = Node::Element {
                        target: Box::new(node),
                        indices,
                        span: Span { start, end },
                    };
                }
                TokenKind::LParen => {
                    self.advance();
                    self.skip_newlines();
                    let args = self.parse_arg_list()?;
                    self.expect(&TokenKind::RParen, "`)`")?;
                    let end = self.prev_end(start);
                    node = Node::Call {
                        callee: Box::new(node),
                        args,
                        span: Span { start, end },
                    };
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_index_list(&mut self) -> PResult<Vec<Node>> {
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.parse_slice_or_expr()?);
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        Ok(items)
    }

    fn at_index_terminator(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Comma | TokenKind::RBracket | TokenKind::Colon)
    }

    fn parse_slice_or_expr(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        let first = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        if !self.check(&TokenKind::Colon) {
            return Ok(*first.expect("non-slice index must have an expression"));
        }
        self.advance();
        self.skip_newlines();
        let stop = if self.at_index_terminator() {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.check(&TokenKind::Colon) {
            self.advance();
            self.skip_newlines();
            if self.at_index_terminator() {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            }
        } else {
            None
        };
        let end = self.prev_end(start);
        Ok(Node::Slice {
            start: first,
            stop,
            step,
            span: Span { start, end },
        })
    }

    fn parse_arg_list(&mut self) -> PResult<Vec<Node>> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_expression()?);
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        match self.peek_kind().clone() {
            TokenKind::Int { text, radix } => {
                let span = self.advance().span;
                Ok(Node::Constant(Constant::Int { text, radix }, span))
            }
            TokenKind::Float { text, imaginary } => {
                let span = self.advance().span;
                Ok(Node::Constant(Constant::Float { text, imaginary }, span))
            }
            TokenKind::Str(s) => {
                let span = self.advance().span;
                Ok(Node::Constant(Constant::Str(s), span))
            }
            TokenKind::Regex(s) => {
                let span = self.advance().span;
                Ok(Node::Constant(Constant::Regex(s), span))
            }
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                match name.as_ref() {
                    "none" => Ok(Node::Constant(Constant::None, span)),
                    "true" => Ok(Node::Constant(Constant::Bool(true), span)),
                    "false" => Ok(Node::Constant(Constant::Bool(false), span)),
                    _ => Ok(Node::Name(name, span)),
                }
            }
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                if self.check(&TokenKind::RParen) {
                    let end = self.advance().span.end;
                    return Ok(Node::Tuple(Vec::new(), Span { start, end }));
                }
                let first = self.parse_expression()?;
                self.skip_newlines();
                if self.check(&TokenKind::Comma) {
                    let mut items = vec![first];
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        self.skip_newlines();
                        if self.check(&TokenKind::RParen) {
                            break;
                        }
                        items.push(self.parse_expression()?);
                        self.skip_newlines();
                    }
                    let end = self.expect(&TokenKind::RParen, "`)`")?.span.end;
                    Ok(Node::Tuple(items, Span { start, end }))
                } else {
                    let end = self.expect(&TokenKind::RParen, "`)`")?.span.end;
                    Ok(reanchor_span(first, Span { start, end }))
                }
            }
            TokenKind::LBracket => {
                self.advance();
                self.skip_newlines();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    items.push(self.parse_expression()?);
                    self.skip_newlines();
                    if self.check(&TokenKind::Comma) {
                        self.advance();
                        self.skip_newlines();
                    } else {
                        break;
                    }
                }
                let end = self.expect(&TokenKind::RBracket, "`]`")?.span.end;
                Ok(Node::List(items, Span { start, end }))
            }
            TokenKind::LBrace => self.parse_dict_or_set(),
            other => Err(ParseError::unexpected(&other, "an expression", self.peek().span)),
        }
    }

    fn parse_dict_or_set(&mut self) -> PResult<Node> {
        let start = self.peek().span.start;
        self.advance(); // `{`
        self.skip_newlines();
        if self.check(&TokenKind::RBrace) {
            let end = self.advance().span.end;
            return Ok(Node::DictLit(Vec::new(), Span { start, end }));
        }
        let first = self.parse_expression()?;
        self.skip_newlines();
        if self.check(&TokenKind::Colon) {
            self.advance();
            self.skip_newlines();
            let value = self.parse_expression()?;
            let mut pairs = vec![(first, value)];
            self.skip_newlines();
            while self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let k = self.parse_expression()?;
                self.expect(&TokenKind::Colon, "`:`")?;
                self.skip_newlines();
                let v = self.parse_expression()?;
                pairs.push((k, v));
                self.skip_newlines();
            }
            let end = self.expect(&TokenKind::RBrace, "`}`")?.span.end;
            Ok(Node::DictLit(pairs, Span { start, end }))
        } else {
            let mut items = vec![first];
            self.skip_newlines();
            while self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                items.push(self.parse_expression()?);
                self.skip_newlines();
            }
            let end = self.expect(&TokenKind::RBrace, "`}`")?.span.end;
            Ok(Node::SetLit(items, Span { start, end }))
        }
    }
}

fn reanchor_span(node: Node, span: Span) -> Node {
    match node {
        Node::Constant(c, _) => Node::Constant(c, span),
        Node::Name(n, _) => Node::Name(n, span),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(src: &str) -> Node {
        let tokens = tokenize(src).unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let prog = parse("1 + 2 * 3");
        if let Node::Program(stmts, _) = prog {
            match &stmts[0] {
                Node::ExprStmt(expr, _) => match expr.as_ref() {
                    Node::BinaryOp { op: OpKind::Add, right, .. } => {
                        assert!(matches!(right.as_ref(), Node::BinaryOp { op: OpKind::Mul, .. }));
                    }
                    other => panic!("expected add at top, got {:?}", other),
                },
                other => panic!("expected expr stmt, got {:?}", other),
            }
        } else {
            unreachable!()
        }
    }

    #[test]
    fn chained_comparison_collapses_to_one_node() {
        let prog = parse("1 < 2 < 3");
        if let Node::Program(stmts, _) = prog {
            match &stmts[0] {
                Node::ExprStmt(expr, _) => match expr.as_ref() {
                    Node::RichCompare { ops, operands, .. } => {
                        assert_eq!(ops.len(), 2);
                        assert_eq!(operands.len(), 3);
                    }
                    other => panic!("expected RichCompare, got {:?}", other),
                },
                other => panic!("expected expr stmt, got {:?}", other),
            }
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let prog = parse("x = y = 1");
        if let Node::Program(stmts, _) = prog {
            match &stmts[0] {
                Node::Assign { value, .. } => {
                    assert!(matches!(value.as_ref(), Node::Assign { .. }));
                }
                other => panic!("expected assign, got {:?}", other),
            }
        }
    }

    #[test]
    fn catch_without_type_binds_name() {
        let prog = parse("try { throw Exception('x') } catch e { ret e }");
        if let Node::Program(stmts, _) = prog {
            match &stmts[0] {
                Node::Try { catches, .. } => {
                    assert_eq!(catches[0].binding.as_deref(), Some("e"));
                    assert!(catches[0].exc_types.is_empty());
                }
                other => panic!("expected try, got {:?}", other),
            }
        }
    }

    #[test]
    fn function_def_with_default_and_variadic() {
        let prog = parse("func f(a, b = 1, *rest) { ret a }");
        if let Node::Program(stmts, _) = prog {
            match &stmts[0] {
                Node::FuncDef { params, .. } => {
                    assert_eq!(params.len(), 3);
                    assert!(params[2].variadic);
                    assert!(params[1].default.is_some());
                }
                other => panic!("expected func def, got {:?}", other),
            }
        }
    }
}
