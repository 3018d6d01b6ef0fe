//! Compile a [`Filter`] into a parameterized SQL fragment

use crate::ast::{Column, Field, Filter, Literal};

/// A SQL fragment with `?` placeholders and the values to bind, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    pub fragment: String,
    pub params: Vec<String>,
}

impl Translation {
    /// Whether there is nothing to filter on
    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }
}

impl Filter {
    /// Render this filter as SQL against the session index
    ///
    /// Column comparisons become `<column> <op> ?`, except a quoted date on
    /// `updated_at`, which is converted to unix millis inside SQL. A number on
    /// `updated_at` is taken as millis directly. `meta.<key>` comparisons
    /// become `(meta.key = ? AND meta.value <op> ?)` binding the key then the
    /// value. No literal value ever appears in the fragment.
    pub fn to_sql(&self) -> Translation {
        let mut out = Translation::default();
        write_sql(self, &mut out);
        out
    }
}

fn write_sql(filter: &Filter, out: &mut Translation) {
    match filter {
        Filter::Compare { field, op, value } => match field {
            Field::Column(column) => {
                out.fragment.push_str(column.name());
                out.fragment.push(' ');
                out.fragment.push_str(op.as_sql());
                match (column, value) {
                    // Stored as unix millis; a date literal is converted in SQL
                    (Column::UpdatedAt, Literal::Text(_)) => {
                        out.fragment.push_str(" CAST(strftime('%s', ?) AS INTEGER) * 1000");
                    }
                    _ => out.fragment.push_str(" ?"),
                }
                out.params.push(value.as_param().to_string());
            }
            Field::Meta(key) => {
                out.fragment.push_str("(meta.key = ? AND meta.value ");
                out.fragment.push_str(op.as_sql());
                out.fragment.push_str(" ?)");
                out.params.push(key.clone());
                out.params.push(value.as_param().to_string());
            }
        },
        Filter::And(lhs, rhs) => {
            write_sql(lhs, out);
            out.fragment.push_str(" AND ");
            write_sql(rhs, out);
        }
        Filter::Or(lhs, rhs) => {
            write_sql(lhs, out);
            out.fragment.push_str(" OR ");
            write_sql(rhs, out);
        }
        Filter::Not(inner) => {
            out.fragment.push_str("NOT ");
            write_sql(inner, out);
        }
        Filter::Group(inner) => {
            out.fragment.push('(');
            write_sql(inner, out);
            out.fragment.push(')');
        }
    }
}
