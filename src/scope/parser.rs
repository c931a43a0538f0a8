//! Recursive-descent parser
//!
//! Precedence, loosest first: `?:`, `||`, `&&`, `|`, `^`, `&`, equality,
//! relational, shifts, additive, multiplicative, unary, `**`, postfix.
//!
//! Comparison chains are normalised while parsing: `A < B <= C` becomes
//! `(A < B) && (B <= C)`, and so does any two-operator chain mixing equality
//! and relational operators, such as `0 <= x != 5`. Longer mixed chains keep
//! the usual precedence.

use super::EvalError;
use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::{Token, tokenize};
use crate::types::Value;

/// Nesting limit for parenthesised and unary sub-expressions.
const MAX_NESTING: usize = 128;

/// Limit on operator nodes in one expression. Bounds the depth of flat
/// operator chains, which the nesting limit does not see.
const MAX_NODES: usize = 512;

pub(crate) fn parse(src: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0, nodes: 0 };
    let expr = parser.conditional()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(EvalError::UnexpectedToken(format!("{token:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    nodes: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), EvalError> {
        match self.peek() {
            Some(t) if t == token => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(EvalError::UnexpectedToken(format!("{t:?}"))),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_NESTING { Err(EvalError::RecursionLimit) } else { Ok(()) }
    }

    /// Account for `count` new operator nodes.
    fn grow(&mut self, count: usize) -> Result<(), EvalError> {
        self.nodes += count;
        if self.nodes > MAX_NODES { Err(EvalError::RecursionLimit) } else { Ok(()) }
    }

    fn conditional(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let condition = self.or()?;
        let expr = if self.eat(&Token::Question) {
            self.grow(1)?;
            let then = self.conditional()?;
            self.expect(&Token::Colon)?;
            let otherwise = self.conditional()?;
            Expr::Conditional(Box::new(condition), Box::new(then), Box::new(otherwise))
        } else {
            condition
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            self.grow(1)?;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.bit_or()?;
        while self.eat(&Token::AndAnd) {
            self.grow(1)?;
            let rhs = self.bit_or()?;
            lhs = Expr::and(lhs, rhs);
        }
        Ok(lhs)
    }

    fn bit_or(&mut self) -> Result<Expr, EvalError> {
        self.left_assoc(Self::bit_xor, |t| matches!(t, Token::Pipe).then_some(BinaryOp::BitOr))
    }

    fn bit_xor(&mut self) -> Result<Expr, EvalError> {
        self.left_assoc(Self::bit_and, |t| matches!(t, Token::Caret).then_some(BinaryOp::BitXor))
    }

    fn bit_and(&mut self) -> Result<Expr, EvalError> {
        self.left_assoc(Self::comparison, |t| matches!(t, Token::Amp).then_some(BinaryOp::BitAnd))
    }

    /// Equality and relational operators, collected as one chain.
    fn comparison(&mut self) -> Result<Expr, EvalError> {
        let mut operands = vec![self.shift()?];
        let mut ops = Vec::new();
        while let Some(op) = self.peek().and_then(|t| match t {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::Ne),
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        }) {
            self.pos += 1;
            // a comparison plus the `&&` joining it to the previous one
            self.grow(2)?;
            ops.push(op);
            operands.push(self.shift()?);
        }
        Ok(build_comparison(operands, &ops))
    }

    fn shift(&mut self) -> Result<Expr, EvalError> {
        self.left_assoc(Self::additive, |t| match t {
            Token::Shl => Some(BinaryOp::Shl),
            Token::Shr => Some(BinaryOp::Shr),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, EvalError> {
        self.left_assoc(Self::multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, EvalError> {
        self.left_assoc(Self::unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn left_assoc(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, EvalError>,
        op_of: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, EvalError> {
        let mut lhs = next(self)?;
        while let Some(op) = self.peek().and_then(op_of) {
            self.pos += 1;
            self.grow(1)?;
            let rhs = next(self)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Tilde) => UnaryOp::BitNot,
            _ => return self.power(),
        };
        self.pos += 1;
        self.enter()?;
        self.grow(1)?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    /// `**` is right-associative and binds tighter than a leading unary minus.
    fn power(&mut self) -> Result<Expr, EvalError> {
        let base = self.postfix()?;
        if self.eat(&Token::StarStar) {
            self.enter()?;
            self.grow(1)?;
            let exponent = self.unary()?;
            self.depth -= 1;
            Ok(Expr::binary(BinaryOp::Pow, base, exponent))
        } else {
            Ok(base)
        }
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.primary()?;
        loop {
            if matches!(self.peek(), Some(Token::Dot | Token::LBracket | Token::LParen)) {
                self.grow(1)?;
            }
            if self.eat(&Token::Dot) {
                let name = match self.tokens.get(self.pos) {
                    Some(Token::Ident(name)) => name.clone(),
                    Some(t) => return Err(EvalError::UnexpectedToken(format!("{t:?}"))),
                    None => return Err(EvalError::UnexpectedEnd),
                };
                self.pos += 1;
                expr = match expr {
                    Expr::Ident(base) if base == "raw" => Expr::Raw(name),
                    other => Expr::Member(Box::new(other), name),
                };
            } else if self.eat(&Token::LBracket) {
                let index = self.conditional()?;
                self.expect(&Token::RBracket)?;
                expr = match (expr, index) {
                    (Expr::Ident(base), Expr::Literal(Value::Str(name))) if base == "raw" => {
                        Expr::Raw(name)
                    }
                    (base, index) => Expr::Index(Box::new(base), Box::new(index)),
                };
            } else if self.eat(&Token::LParen) {
                let args = self.arguments()?;
                let callee = match expr {
                    Expr::Ident(name) => name,
                    Expr::Member(base, name) if *base == Expr::Ident("Math".into()) => name,
                    other => return Err(EvalError::NotCallable(format!("{other:?}"))),
                };
                expr = Expr::Call(callee, args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(EvalError::UnexpectedEnd)?;
        self.pos += 1;
        match token {
            Token::Number(v) => Ok(Expr::Literal(v)),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let inner = self.conditional()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.conditional()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Array(items))
            }
            other => Err(EvalError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

fn is_equality(op: &BinaryOp) -> bool {
    matches!(op, BinaryOp::Eq | BinaryOp::Ne)
}

/// Purely relational chains and two-operator chains are normalised. Longer
/// chains with `==`/`!=` group their relational runs first, then apply the
/// equality operators left to right.
fn build_comparison(operands: Vec<Expr>, ops: &[BinaryOp]) -> Expr {
    if ops.len() == 2 || !ops.iter().any(is_equality) {
        return normalize_chain(operands, ops);
    }

    let mut operands = operands.into_iter();
    let mut run = operands.next().into_iter().collect::<Vec<_>>();
    let mut run_ops = Vec::new();
    let mut segments = Vec::new();
    let mut equality_ops = Vec::new();
    for (op, operand) in ops.iter().zip(operands) {
        if is_equality(op) {
            segments.push(normalize_chain(std::mem::take(&mut run), &std::mem::take(&mut run_ops)));
            equality_ops.push(*op);
        } else {
            run_ops.push(*op);
        }
        run.push(operand);
    }
    segments.push(normalize_chain(run, &run_ops));

    let mut segments = segments.into_iter();
    let first = segments.next().unwrap_or(Expr::Literal(Value::Null));
    equality_ops.into_iter().zip(segments).fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs))
}

/// `A op1 B op2 C` becomes `(A op1 B) && (B op2 C)`.
fn normalize_chain(mut operands: Vec<Expr>, ops: &[BinaryOp]) -> Expr {
    if ops.is_empty() {
        return operands.swap_remove(0);
    }
    let mut comparisons = ops
        .iter()
        .enumerate()
        .map(|(i, op)| Expr::binary(*op, operands[i].clone(), operands[i + 1].clone()));
    let first = comparisons.next();
    comparisons.fold(first.unwrap_or(Expr::Literal(Value::Bool(true))), Expr::and)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.into())
    }

    fn int(v: i64) -> Expr {
        Expr::Literal(Value::Int(v))
    }

    #[test]
    fn interval_guards_become_conjunctions() {
        assert_eq!(
            parse("5 <= x < 10").unwrap(),
            Expr::and(
                Expr::binary(BinaryOp::Le, int(5), ident("x")),
                Expr::binary(BinaryOp::Lt, ident("x"), int(10)),
            )
        );
    }

    #[test]
    fn single_comparison_is_left_alone() {
        assert_eq!(parse("x > 1").unwrap(), Expr::binary(BinaryOp::Gt, ident("x"), int(1)));
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(
            parse("1 + 2 * 3").unwrap(),
            Expr::binary(BinaryOp::Add, int(1), Expr::binary(BinaryOp::Mul, int(2), int(3)))
        );
        assert_eq!(
            parse("2 ** 3 ** 2").unwrap(),
            Expr::binary(BinaryOp::Pow, int(2), Expr::binary(BinaryOp::Pow, int(3), int(2)))
        );
        assert_eq!(
            parse("-2 ** 2").unwrap(),
            Expr::Unary(UnaryOp::Neg, Box::new(Expr::binary(BinaryOp::Pow, int(2), int(2))))
        );
    }

    #[test]
    fn raw_access_and_math_calls() {
        assert_eq!(parse("raw.volts").unwrap(), Expr::Raw("volts".into()));
        assert_eq!(parse("raw['volts']").unwrap(), Expr::Raw("volts".into()));
        assert_eq!(parse("Math.abs(x)").unwrap(), Expr::Call("abs".into(), vec![ident("x")]));
        assert_eq!(
            parse("Math.PI").unwrap(),
            Expr::Member(Box::new(ident("Math")), "PI".into())
        );
    }

    #[test]
    fn malformed_expressions_are_errors() {
        assert!(parse("1 +").is_err());
        assert!(parse("(1").is_err());
        assert!(parse("1 2").is_err());
        assert!(parse("a ? b").is_err());
        assert!(parse("(1)(2)").is_err());
        assert!(parse(&"(".repeat(500)).is_err());
    }

    #[test]
    fn mixed_two_operator_chains_become_conjunctions() {
        assert_eq!(
            parse("0 <= x != 5").unwrap(),
            Expr::and(
                Expr::binary(BinaryOp::Le, int(0), ident("x")),
                Expr::binary(BinaryOp::Ne, ident("x"), int(5)),
            )
        );
        assert_eq!(
            parse("a == b == c").unwrap(),
            Expr::and(
                Expr::binary(BinaryOp::Eq, ident("a"), ident("b")),
                Expr::binary(BinaryOp::Eq, ident("b"), ident("c")),
            )
        );
        assert_eq!(parse("a == b").unwrap(), Expr::binary(BinaryOp::Eq, ident("a"), ident("b")));
    }

    #[test]
    fn longer_mixed_chains_keep_precedence() {
        assert_eq!(
            parse("a < b == c < d != e").unwrap(),
            Expr::binary(
                BinaryOp::Ne,
                Expr::binary(
                    BinaryOp::Eq,
                    Expr::binary(BinaryOp::Lt, ident("a"), ident("b")),
                    Expr::binary(BinaryOp::Lt, ident("c"), ident("d")),
                ),
                ident("e"),
            )
        );
    }

    #[test]
    fn long_flat_chains_are_rejected() {
        assert_eq!(parse(&vec!["1"; 10_000].join(" + ")), Err(EvalError::RecursionLimit));
        assert_eq!(parse(&vec!["x"; 2_000].join(" < ")), Err(EvalError::RecursionLimit));
        assert_eq!(parse(&vec!["x"; 2_000].join(" || ")), Err(EvalError::RecursionLimit));
        assert!(parse(&vec!["1"; 100].join(" + ")).is_ok());
    }
}
