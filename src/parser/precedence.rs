//! The binary/unary operator tower (spec.md §4.3), highest to lowest
//! precedence. `binding_power` backs the Pratt loop in `parser::mod`.

use crate::ast::OpKind;
use crate::lexer::token::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Precedence(pub u8);

pub const POW: Precedence = Precedence(12);
pub const MUL: Precedence = Precedence(11);
pub const ADD: Precedence = Precedence(10);
pub const SHIFT: Precedence = Precedence(9);
pub const BIT_AND: Precedence = Precedence(8);
pub const BIT_XOR: Precedence = Precedence(7);
pub const BIT_OR: Precedence = Precedence(6);
pub const COMPARE: Precedence = Precedence(5);
pub const LOGIC_AND: Precedence = Precedence(4);
pub const LOGIC_OR: Precedence = Precedence(3);
pub const NULL_COALESCE: Precedence = Precedence(2);
pub const CONDITIONAL: Precedence = Precedence(1);

/// Binary operator bound by a token, with its precedence and whether it is
/// part of the rich-compare chain (spec.md §4.3's comparison tower).
pub fn binary_op(kind: &TokenKind) -> Option<(OpKind, Precedence, bool)> {
    use TokenKind::*;
    Some(match kind {
        StarStar => (OpKind::Pow, POW, true),
        Star => (OpKind::Mul, MUL, false),
        At => (OpKind::MatMul, MUL, false),
        Slash => (OpKind::Div, MUL, false),
        SlashSlash => (OpKind::FloorDiv, MUL, false),
        Percent => (OpKind::Mod, MUL, false),
        Plus => (OpKind::Add, ADD, false),
        Minus => (OpKind::Sub, ADD, false),
        Shl => (OpKind::Shl, SHIFT, false),
        Shr => (OpKind::Shr, SHIFT, false),
        Amp => (OpKind::BitAnd, BIT_AND, false),
        Caret => (OpKind::BitXor, BIT_XOR, false),
        Pipe => (OpKind::BitOr, BIT_OR, false),
        In => (OpKind::In, COMPARE, false),
        EqEqEq => (OpKind::IdEq, COMPARE, false),
        EqEq => (OpKind::Eq, COMPARE, false),
        Ne => (OpKind::Ne, COMPARE, false),
        Lt => (OpKind::Lt, COMPARE, false),
        Le => (OpKind::Le, COMPARE, false),
        Gt => (OpKind::Gt, COMPARE, false),
        Ge => (OpKind::Ge, COMPARE, false),
        AndAnd => (OpKind::AndAnd, LOGIC_AND, false),
        OrOr => (OpKind::OrOr, LOGIC_OR, false),
        QuesQues => (OpKind::QuesQues, NULL_COALESCE, false),
        _ => return None,
    })
}

pub fn is_comparison_token(kind: &TokenKind) -> bool {
    binary_op(kind).map(|(op, _, _)| op.is_comparison()).unwrap_or(false)
}

/// Augmented-assignment token to its underlying binary `OpKind`, or `None`
/// for plain `=`.
pub fn assignment_op(kind: &TokenKind) -> Option<Option<OpKind>> {
    use TokenKind::*;
    Some(match kind {
        Assign => None,
        PlusEq => Some(OpKind::Add),
        MinusEq => Some(OpKind::Sub),
        StarEq => Some(OpKind::Mul),
        SlashEq => Some(OpKind::Div),
        SlashSlashEq => Some(OpKind::FloorDiv),
        PercentEq => Some(OpKind::Mod),
        StarStarEq => Some(OpKind::Pow),
        AtEq => Some(OpKind::MatMul),
        AmpEq => Some(OpKind::BitAnd),
        PipeEq => Some(OpKind::BitOr),
        CaretEq => Some(OpKind::BitXor),
        ShlEq => Some(OpKind::Shl),
        ShrEq => Some(OpKind::Shr),
        QuesQuesEq => Some(OpKind::QuesQues),
        AndAndEq => Some(OpKind::AndAnd),
        OrOrEq => Some(OpKind::OrOr),
        _ => return None,
    })
}
