//! Parsed statements: query descriptors, mutation statements and schema definitions.

use super::expr::{Operand, SortOrder};
use super::predicate::Predicate;
use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use tarn_core::schema::Table;
use tarn_core::{Error, Result};

/// One entry of a SELECT list.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    /// `*`: every column in schema order.
    Wildcard,
    /// A single column.
    Column(String),
    /// `count(*) [AS alias]`.
    Count { alias: String },
}

/// `ORDER BY column [ASC|DESC]`.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub order: SortOrder,
}

/// An immutable, validated-once query template.
///
/// A descriptor holds no values for its parameter slots; those come from a
/// [`Binding`](crate::Binding) at evaluation time, so the same descriptor can be
/// re-evaluated with new parameters without re-parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDescriptor {
    table: String,
    items: Vec<SelectItem>,
    predicate: Option<Predicate>,
    group_by: Option<String>,
    order_by: Option<OrderBy>,
    params: BTreeSet<String>,
}

impl QueryDescriptor {
    /// Creates a descriptor from its parts.
    pub fn new(
        table: impl Into<String>,
        items: Vec<SelectItem>,
        predicate: Option<Predicate>,
        group_by: Option<String>,
        order_by: Option<OrderBy>,
    ) -> Self {
        let params = predicate
            .as_ref()
            .map(|p| p.params().into_iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        Self {
            table: table.into(),
            items,
            predicate,
            group_by,
            order_by,
            params,
        }
    }

    /// Parses a SELECT statement into a descriptor.
    pub fn prepare(text: &str) -> Result<Self> {
        match crate::parser::parse(text)? {
            Statement::Select(descriptor) => Ok(descriptor),
            _ => Err(Error::invalid_operation("Expected a SELECT statement")),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn items(&self) -> &[SelectItem] {
        &self.items
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref()
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    /// Named parameter slots, without the `@` prefix.
    pub fn params(&self) -> &BTreeSet<String> {
        &self.params
    }

    /// Returns true if the result is a count rather than a row listing.
    pub fn is_aggregate(&self) -> bool {
        self.group_by.is_some()
            || self
                .items
                .iter()
                .any(|item| matches!(item, SelectItem::Count { .. }))
    }

    /// Columns whose values can influence the result, or None for "all of them".
    ///
    /// An update that assigns none of these columns cannot change the result.
    pub fn referenced_columns(&self) -> Option<Vec<&str>> {
        let mut cols = Vec::new();
        for item in &self.items {
            match item {
                SelectItem::Wildcard => return None,
                SelectItem::Column(c) => cols.push(c.as_str()),
                SelectItem::Count { .. } => {}
            }
        }
        if let Some(p) = &self.predicate {
            cols.extend(p.columns());
        }
        cols.extend(self.group_by.as_deref());
        if let Some(o) = &self.order_by {
            cols.push(o.column.as_str());
        }
        Some(cols)
    }

    /// Names of the result columns, in output order.
    pub fn output_columns(&self, schema: &Table) -> Vec<String> {
        let mut out = Vec::new();
        for item in &self.items {
            match item {
                SelectItem::Wildcard => {
                    out.extend(schema.columns().iter().map(|c| c.name().to_string()))
                }
                SelectItem::Column(c) => out.push(c.clone()),
                SelectItem::Count { alias } => out.push(alias.clone()),
            }
        }
        out
    }

    /// Checks the descriptor against a table schema.
    pub fn validate(&self, schema: &Table) -> Result<()> {
        if schema.name() != self.table {
            return Err(Error::table_not_found(&self.table));
        }
        let check = |column: &str| schema.column_index(column).map(|_| ());

        for item in &self.items {
            if let SelectItem::Column(c) = item {
                check(c)?;
            }
        }
        if let Some(p) = &self.predicate {
            for c in p.columns() {
                check(c)?;
            }
        }
        if let Some(g) = &self.group_by {
            check(g)?;
        }

        if self.is_aggregate() {
            for item in &self.items {
                match item {
                    SelectItem::Wildcard => {
                        return Err(Error::invalid_operation(
                            "SELECT * cannot be combined with aggregation",
                        ))
                    }
                    SelectItem::Column(c) if self.group_by.as_deref() != Some(c.as_str()) => {
                        return Err(Error::invalid_operation(format!(
                            "Column {} must appear in GROUP BY",
                            c
                        )))
                    }
                    _ => {}
                }
            }
            if let Some(o) = &self.order_by {
                if !self.output_columns(schema).contains(&o.column) {
                    return Err(Error::invalid_operation(format!(
                        "ORDER BY {} must name a result column of an aggregate query",
                        o.column
                    )));
                }
            }
        } else if let Some(o) = &self.order_by {
            check(&o.column)?;
        }
        Ok(())
    }
}

/// `INSERT INTO table (columns) VALUES (values)`.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Operand>,
}

/// `UPDATE table SET column = value, ... [WHERE predicate]`.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub assignments: Vec<(String, Operand)>,
    pub predicate: Option<Predicate>,
}

/// `DELETE FROM table [WHERE predicate]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub predicate: Option<Predicate>,
}

/// A parameterized write against one table.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationStatement {
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl MutationStatement {
    /// Parses an INSERT, UPDATE or DELETE statement.
    pub fn prepare(text: &str) -> Result<Self> {
        match crate::parser::parse(text)? {
            Statement::Mutation(m) => Ok(m),
            _ => Err(Error::invalid_operation(
                "Expected an INSERT, UPDATE or DELETE statement",
            )),
        }
    }

    /// Target table.
    pub fn table(&self) -> &str {
        match self {
            MutationStatement::Insert(s) => &s.table,
            MutationStatement::Update(s) => &s.table,
            MutationStatement::Delete(s) => &s.table,
        }
    }

    /// Named parameter slots, without the `@` prefix.
    pub fn params(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        match self {
            MutationStatement::Insert(s) => {
                out.extend(s.values.iter().filter_map(Operand::param).map(String::from));
            }
            MutationStatement::Update(s) => {
                out.extend(
                    s.assignments
                        .iter()
                        .filter_map(|(_, o)| o.param())
                        .map(String::from),
                );
                if let Some(p) = &s.predicate {
                    out.extend(p.params().into_iter().map(String::from));
                }
            }
            MutationStatement::Delete(s) => {
                if let Some(p) = &s.predicate {
                    out.extend(p.params().into_iter().map(String::from));
                }
            }
        }
        out
    }
}

/// Any statement the parser understands.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Select(QueryDescriptor),
    Mutation(MutationStatement),
    CreateTable(Table),
}
