//! Evaluation of marker expressions against the template data.

use crate::{Error, Result, Value};

/// The data visible to an expression.
///
/// The root scope wraps the data the template is filled with. Each loop
/// iteration extends the scope with the loop binding; lookups walk from the
/// innermost binding outwards and end at the root data.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    inner: ScopeInner<'a>,
}

#[derive(Debug, Clone, Copy)]
enum ScopeInner<'a> {
    Root(&'a Value),
    Child {
        parent: &'a Scope<'a>,
        name: &'a str,
        value: &'a Value,
    },
}

impl<'a> Scope<'a> {
    pub(crate) fn new(root: &'a Value) -> Self {
        Self {
            inner: ScopeInner::Root(root),
        }
    }

    /// Extends the scope with a binding shadowing any outer one.
    pub(crate) fn with(&'a self, name: &'a str, value: &'a Value) -> Scope<'a> {
        Self {
            inner: ScopeInner::Child {
                parent: self,
                name,
                value,
            },
        }
    }

    /// Resolves a name, innermost binding first.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        match &self.inner {
            ScopeInner::Child {
                parent,
                name: bound,
                value,
            } => {
                if *bound == name {
                    Some(value)
                } else {
                    parent.lookup(name)
                }
            }
            ScopeInner::Root(Value::Map(map)) => map.get(name),
            ScopeInner::Root(_) => None,
        }
    }
}

/// Evaluates the expressions found in markers.
///
/// The crate ships [`ExprEvaluator`]; implement this trait to plug in a
/// different expression language.
pub trait Evaluator {
    /// Evaluates `expr` against the given scope.
    ///
    /// Returning [`Value::None`] renders as the empty string in variable
    /// position and counts as false in conditions.
    fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value>;
}

/// The built-in expression evaluator.
///
/// Supports dotted paths (`données.courses`, missing segments resolve to
/// [`Value::None`]), list indexing (`courses.0`), `length` on strings and
/// lists, literals (`true`, `false`, `none`, numbers, quoted strings),
/// comparisons, `&&`, `||`, `!` and parentheses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value> {
        let tokens = lex(expr)?;
        let mut parser = Parser {
            src: expr,
            tokens,
            pos: 0,
            scope,
        };
        let value = parser.or_expr()?;
        parser.expect_end()?;
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Dot,
    LParen,
    RParen,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Not,
}

fn lex(expr: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(Error::expression(format!(
                        "expected `==` in expression `{expr}`"
                    )));
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(Error::expression(format!(
                        "expected `&&` in expression `{expr}`"
                    )));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(Error::expression(format!(
                        "expected `||` in expression `{expr}`"
                    )));
                }
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j == chars.len() {
                    return Err(Error::expression(format!(
                        "unterminated string in expression `{expr}`"
                    )));
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                // a dot only belongs to the number when a digit follows,
                // otherwise it is a path separator as in `courses.0.nom`
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(char::is_ascii_digit);
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let repr: String = chars[start..i].iter().collect();
                    let n = repr.parse::<f64>().map_err(|_| {
                        Error::expression(format!("invalid number `{repr}` in expression `{expr}`"))
                    })?;
                    tokens.push(Token::Float(n));
                } else {
                    let repr: String = chars[start..i].iter().collect();
                    let n = repr.parse::<i64>().map_err(|_| {
                        Error::expression(format!("invalid number `{repr}` in expression `{expr}`"))
                    })?;
                    tokens.push(Token::Int(n));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => {
                return Err(Error::expression(format!(
                    "unexpected character `{c}` in expression `{expr}`"
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a, 'v> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    scope: &'a Scope<'v>,
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Parser<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(Error::expression(format!(
                "unexpected trailing input in expression `{}`",
                self.src
            )))
        }
    }

    fn or_expr(&mut self) -> Result<Value> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::OrOr) {
            let truthy = left.is_truthy();
            let right = self.and_expr()?;
            left = Value::Bool(truthy || right.is_truthy());
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Value> {
        let mut left = self.cmp_expr()?;
        while self.eat(&Token::AndAnd) {
            let truthy = left.is_truthy();
            let right = self.cmp_expr()?;
            left = Value::Bool(truthy && right.is_truthy());
        }
        Ok(left)
    }

    fn cmp_expr(&mut self) -> Result<Value> {
        let left = self.unary_expr()?;
        let op = match self.peek() {
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::NotEq) => CmpOp::Ne,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.unary_expr()?;
        Ok(Value::Bool(compare(op, &left, &right)))
    }

    fn unary_expr(&mut self) -> Result<Value> {
        if self.eat(&Token::Not) {
            let value = self.unary_expr()?;
            return Ok(Value::Bool(!value.is_truthy()));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Value::Integer(n)),
            Some(Token::Float(n)) => Ok(Value::Float(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::LParen) => {
                let value = self.or_expr()?;
                if self.eat(&Token::RParen) {
                    Ok(value)
                } else {
                    Err(Error::expression(format!(
                        "missing closing parenthesis in expression `{}`",
                        self.src
                    )))
                }
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" | "none" => Ok(Value::None),
                _ => self.path(name),
            },
            _ => Err(Error::expression(format!(
                "unexpected end of expression `{}`",
                self.src
            ))),
        }
    }

    /// Resolves `name(.segment)*` against the scope. Missing names and
    /// segments resolve to `Value::None` so templates stay usable with
    /// partial data.
    fn path(&mut self, name: String) -> Result<Value> {
        let mut current = match self.scope.lookup(&name) {
            Some(value) => value.clone(),
            None => Value::None,
        };

        while self.eat(&Token::Dot) {
            let resolved = match (self.next(), &current) {
                (Some(Token::Ident(key)), Value::Map(map)) => {
                    map.get(&key).cloned().unwrap_or(Value::None)
                }
                (Some(Token::Ident(key)), Value::List(list)) if key == "length" => {
                    Value::Integer(list.len() as i64)
                }
                (Some(Token::Ident(key)), Value::String(s)) if key == "length" => {
                    Value::Integer(s.chars().count() as i64)
                }
                (Some(Token::Int(index)), Value::List(list)) => usize::try_from(index)
                    .ok()
                    .and_then(|i| list.get(i).cloned())
                    .unwrap_or(Value::None),
                (Some(Token::Ident(_)) | Some(Token::Int(_)), _) => Value::None,
                _ => {
                    return Err(Error::expression(format!(
                        "expected a name after `.` in expression `{}`",
                        self.src
                    )));
                }
            };
            current = resolved;
        }

        Ok(current)
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    match op {
        CmpOp::Eq => left == right,
        CmpOp::Ne => left != right,
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = match (numeric(left), numeric(right)) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => match (left, right) {
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => None,
                },
            };
            match ordering {
                Some(ordering) => match op {
                    CmpOp::Lt => ordering.is_lt(),
                    CmpOp::Le => ordering.is_le(),
                    CmpOp::Gt => ordering.is_gt(),
                    CmpOp::Ge => ordering.is_ge(),
                    CmpOp::Eq | CmpOp::Ne => unreachable!(),
                },
                None => false,
            }
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}
