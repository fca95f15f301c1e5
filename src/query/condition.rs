use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::core::{DbError, Result, Value};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex");
}

/// Reject anything that is not a plain SQL identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DbError::InvalidCondition(format!("invalid identifier '{}'", name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    Like,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::In => "IN",
            Operator::Like => "LIKE",
        }
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "=" => Ok(Operator::Eq),
            "<" => Ok(Operator::Lt),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            "IN" => Ok(Operator::In),
            "LIKE" => Ok(Operator::Like),
            other => Err(DbError::InvalidCondition(format!("unsupported operator '{}'", other))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// How a predicate joins the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

impl FromStr for Conjunction {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Conjunction::And),
            "OR" => Ok(Conjunction::Or),
            other => Err(DbError::InvalidCondition(format!("unsupported conjunction '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
}

impl Operand {
    pub fn value(value: impl Into<Value>) -> Self {
        Operand::Value(value.into())
    }

    pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

/// `(column, operator, operand[, AND|OR])`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub operator: Operator,
    pub operand: Operand,
    pub conjunction: Conjunction,
}

impl Predicate {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            operand: Operand::Value(value.into()),
            conjunction: Conjunction::And,
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }

    pub fn in_list<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::In,
            operand: Operand::list(values),
            conjunction: Conjunction::And,
        }
    }

    /// Build from the loose tuple form, e.g. `("id", "<=", 1, Some("OR"))`.
    pub fn parse(
        column: &str,
        operator: &str,
        operand: Operand,
        conjunction: Option<&str>,
    ) -> Result<Self> {
        let predicate = Self {
            column: column.to_string(),
            operator: operator.parse()?,
            operand,
            conjunction: conjunction.map(str::parse).transpose()?.unwrap_or_default(),
        };
        predicate.validate()?;
        Ok(predicate)
    }

    /// Join the next predicate with OR.
    pub fn or(mut self) -> Self {
        self.conjunction = Conjunction::Or;
        self
    }

    pub fn and(mut self) -> Self {
        self.conjunction = Conjunction::And;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.column)?;
        match (&self.operator, &self.operand) {
            (Operator::In, Operand::List(values)) if values.is_empty() => Err(
                DbError::InvalidCondition(format!("IN list for '{}' is empty", self.column)),
            ),
            (Operator::In, Operand::List(_)) => Ok(()),
            (Operator::In, Operand::Value(_)) => Err(DbError::InvalidCondition(format!(
                "IN on '{}' needs a list operand",
                self.column
            ))),
            (_, Operand::List(_)) => Err(DbError::InvalidCondition(format!(
                "{} on '{}' needs a single value",
                self.operator, self.column
            ))),
            (_, Operand::Value(_)) => Ok(()),
        }
    }

    fn push_sql(&self, sql: &mut String, args: &mut Vec<Value>) {
        sql.push_str(&self.column);
        sql.push(' ');
        sql.push_str(self.operator.as_sql());
        match &self.operand {
            Operand::Value(value) => {
                sql.push_str(" ?");
                args.push(value.clone());
            }
            Operand::List(values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!(" ({})", placeholders));
                args.extend(values.iter().cloned());
            }
        }
    }
}

/// An ordered list of predicates rendered left to right.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereCondition {
    predicates: Vec<Predicate>,
}

impl WhereCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Render as `col op ? CONJ col op ?` with positional arguments.
    /// The last predicate's conjunction is ignored.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let mut sql = String::new();
        let mut args = Vec::new();
        for (index, predicate) in self.predicates.iter().enumerate() {
            predicate.validate()?;
            if index > 0 {
                sql.push(' ');
                sql.push_str(self.predicates[index - 1].conjunction.as_sql());
                sql.push(' ');
            }
            predicate.push_sql(&mut sql, &mut args);
        }
        Ok((sql, args))
    }
}

impl FromIterator<Predicate> for WhereCondition {
    fn from_iter<I: IntoIterator<Item = Predicate>>(iter: I) -> Self {
        Self {
            predicates: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            other => Err(DbError::InvalidCondition(format!("unsupported order direction '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }

    pub fn parse(column: &str, direction: &str) -> Result<Self> {
        validate_identifier(column)?;
        Ok(Self {
            column: column.to_string(),
            direction: direction.parse()?,
        })
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        write!(f, "{} {}", self.column, direction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderByCondition {
    orders: Vec<OrderBy>,
}

impl OrderByCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, order: OrderBy) -> Self {
        self.orders.push(order);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn to_sql(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.orders.len());
        for order in &self.orders {
            validate_identifier(&order.column)?;
            parts.push(order.to_string());
        }
        Ok(parts.join(", "))
    }
}

/// Filter and ordering for `finds` and `count`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    pub filter: WhereCondition,
    pub order: OrderByCondition,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter.push(predicate);
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order = self.order.with(order);
        self
    }
}

impl From<WhereCondition> for Condition {
    fn from(filter: WhereCondition) -> Self {
        Self {
            filter,
            order: OrderByCondition::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_conjunction_scenario() {
        let condition = WhereCondition::new()
            .with(Predicate::parse("id", "<=", Operand::value(1), Some("OR")).unwrap())
            .with(Predicate::parse("id", ">", Operand::value(2), None).unwrap());
        let (sql, args) = condition.to_sql().unwrap();
        assert_eq!(sql, "id <= ? OR id > ?");
        assert_eq!(args, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_in_expands_placeholders() {
        let condition = WhereCondition::new()
            .with(Predicate::equals("user_id", 10u64))
            .with(Predicate::in_list("item_id", [3, 4, 5]));
        let (sql, args) = condition.to_sql().unwrap();
        assert_eq!(sql, "user_id = ? AND item_id IN (?, ?, ?)");
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(Predicate::parse("id", "!=", Operand::value(1), None).is_err());
        assert!(Predicate::parse("id", "=", Operand::value(1), Some("XOR")).is_err());
        assert!(Predicate::parse("id; DROP", "=", Operand::value(1), None).is_err());
        assert!(Predicate::parse("id", "IN", Operand::value(1), None).is_err());
        assert!(Predicate::parse("id", "=", Operand::list([1, 2]), None).is_err());

        let empty_in = WhereCondition::new().with(Predicate::in_list("id", Vec::<i64>::new()));
        assert!(matches!(empty_in.to_sql(), Err(DbError::InvalidCondition(_))));
    }

    #[test]
    fn test_order_by() {
        let order = OrderByCondition::new()
            .with(OrderBy::parse("level", "desc").unwrap())
            .with(OrderBy::asc("id"));
        assert_eq!(order.to_sql().unwrap(), "level DESC, id ASC");
        assert!(OrderBy::parse("id", "UP").is_err());
    }

    #[test]
    fn test_like_operator() {
        let (sql, args) = WhereCondition::new()
            .with(Predicate::new("name", "like".parse().unwrap(), "bob%"))
            .to_sql()
            .unwrap();
        assert_eq!(sql, "name LIKE ?");
        assert_eq!(args, vec![Value::Text("bob%".into())]);
    }
}
