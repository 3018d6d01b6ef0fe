//! Typed filter AST

use std::fmt;

/// Comparison operator between a field and a literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// SQL spelling of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Session columns a filter may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    ClientId,
    UserAgent,
    Os,
    OsVersion,
    Browser,
    BrowserVersion,
    Device,
    UserId,
    UserEmail,
    UserName,
    /// Unix milliseconds; compared against dates or raw millis
    UpdatedAt,
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::Id,
        Column::ClientId,
        Column::UserAgent,
        Column::Os,
        Column::OsVersion,
        Column::Browser,
        Column::BrowserVersion,
        Column::Device,
        Column::UserId,
        Column::UserEmail,
        Column::UserName,
        Column::UpdatedAt,
    ];

    /// Column name in the session index
    pub fn name(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::ClientId => "client_id",
            Column::UserAgent => "user_agent",
            Column::Os => "os",
            Column::OsVersion => "os_version",
            Column::Browser => "browser",
            Column::BrowserVersion => "browser_version",
            Column::Device => "device",
            Column::UserId => "user_id",
            Column::UserEmail => "user_email",
            Column::UserName => "user_name",
            Column::UpdatedAt => "updated_at",
        }
    }

    /// Look up a column by its exact name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Left-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// A plain session column
    Column(Column),
    /// `meta.<key>`, matched against the key/value side table
    Meta(String),
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Text(String),
    /// Kept in its literal text form; always bound as a string
    Number(String),
}

impl Literal {
    /// Value bound for this literal
    pub fn as_param(&self) -> &str {
        match self {
            Literal::Text(text) | Literal::Number(text) => text,
        }
    }
}

/// Parsed boolean filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Compare {
        field: Field,
        op: CompareOp,
        value: Literal,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    /// Parentheses written in the query, kept so the output mirrors the input
    Group(Box<Filter>),
}

impl Filter {
    /// Whether any comparison in this subtree is on `meta.<key>`
    pub fn references_meta(&self) -> bool {
        match self {
            Filter::Compare { field, .. } => matches!(field, Field::Meta(_)),
            Filter::And(lhs, rhs) | Filter::Or(lhs, rhs) => {
                lhs.references_meta() || rhs.references_meta()
            }
            Filter::Not(inner) | Filter::Group(inner) => inner.references_meta(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Compare { field, op, value } => {
                match field {
                    Field::Column(column) => write!(f, "{}", column.name())?,
                    Field::Meta(key) => write!(f, "meta.{key}")?,
                }
                match value {
                    Literal::Text(text) => {
                        // Literals have no escapes; quote with the character the text lacks
                        let quote = if text.contains('\'') { '"' } else { '\'' };
                        write!(f, " {} {quote}{text}{quote}", op.as_sql())
                    }
                    Literal::Number(number) => write!(f, " {} {}", op.as_sql(), number),
                }
            }
            Filter::And(lhs, rhs) => write!(f, "{lhs} AND {rhs}"),
            Filter::Or(lhs, rhs) => write!(f, "{lhs} OR {rhs}"),
            Filter::Not(inner) => write!(f, "NOT {inner}"),
            Filter::Group(inner) => write!(f, "({inner})"),
        }
    }
}
