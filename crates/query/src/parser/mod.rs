//! Recursive-descent parser for the statement subset the replica understands.
//!
//! Supported forms:
//! - `SELECT * | cols | col, count(*) [AS alias] FROM t [WHERE pred] [GROUP BY col] [ORDER BY col [ASC|DESC]]`
//! - `INSERT INTO t (cols) VALUES (operands)`
//! - `UPDATE t SET col = operand, ... [WHERE pred]`
//! - `DELETE FROM t [WHERE pred]`
//! - `CREATE TABLE t (col TYPE [PRIMARY KEY] [NOT NULL], ...)`
//!
//! A predicate is `col = operand` or `col LIKE operand`, joined with `AND`.
//! An operand is a literal or a named parameter `@name`.

mod lexer;

use crate::ast::{
    DeleteStatement, InsertStatement, MutationStatement, Operand, OrderBy, Predicate,
    QueryDescriptor, SelectItem, SortOrder, Statement, UpdateStatement,
};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use lexer::{Spanned, Token};
use tarn_core::schema::{Column, TableBuilder};
use tarn_core::{DataType, Error, Result, Value};

/// Parses one statement. A trailing `;` is allowed.
pub fn parse(text: &str) -> Result<Statement> {
    let tokens = lexer::tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.statement()?;
    parser.eat(&Token::Semicolon);
    parser.expect_end()?;
    Ok(statement)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].position
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if token != Token::End {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, expected: &str) -> Result<T> {
        Err(Error::parse(
            format!("Expected {}, found {}", expected, self.peek().describe()),
            self.position(),
        ))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            self.error(&token.describe())
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            self.error(keyword)
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            Token::End => Ok(()),
            _ => self.error("end of statement"),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Token::Word(w) if !is_reserved(w) => {
                let w = w.clone();
                self.bump();
                Ok(w)
            }
            _ => self.error("identifier"),
        }
    }

    fn ident_list(&mut self) -> Result<Vec<String>> {
        let mut out = alloc::vec![self.ident()?];
        while self.eat(&Token::Comma) {
            out.push(self.ident()?);
        }
        Ok(out)
    }

    fn statement(&mut self) -> Result<Statement> {
        if self.eat_keyword("SELECT") {
            self.select().map(Statement::Select)
        } else if self.eat_keyword("INSERT") {
            self.insert().map(|s| Statement::Mutation(MutationStatement::Insert(s)))
        } else if self.eat_keyword("UPDATE") {
            self.update().map(|s| Statement::Mutation(MutationStatement::Update(s)))
        } else if self.eat_keyword("DELETE") {
            self.delete().map(|s| Statement::Mutation(MutationStatement::Delete(s)))
        } else if self.eat_keyword("CREATE") {
            self.create_table()
        } else {
            self.error("SELECT, INSERT, UPDATE, DELETE or CREATE")
        }
    }

    fn select(&mut self) -> Result<QueryDescriptor> {
        let items = if self.eat(&Token::Star) {
            alloc::vec![SelectItem::Wildcard]
        } else {
            let mut items = alloc::vec![self.select_item()?];
            while self.eat(&Token::Comma) {
                items.push(self.select_item()?);
            }
            items
        };
        self.expect_keyword("FROM")?;
        let table = self.ident()?;
        let predicate = self.where_clause()?;

        let group_by = if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            Some(self.ident()?)
        } else {
            None
        };
        let order_by = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let column = self.ident()?;
            let order = if self.eat_keyword("DESC") {
                SortOrder::Desc
            } else {
                self.eat_keyword("ASC");
                SortOrder::Asc
            };
            Some(OrderBy { column, order })
        } else {
            None
        };
        Ok(QueryDescriptor::new(table, items, predicate, group_by, order_by))
    }

    fn select_item(&mut self) -> Result<SelectItem> {
        let is_count = self.peek().is_keyword("COUNT")
            && self.tokens.get(self.pos + 1).map(|s| &s.token) == Some(&Token::LParen);
        if !is_count {
            return self.ident().map(SelectItem::Column);
        }
        self.bump();
        self.expect(Token::LParen)?;
        self.expect(Token::Star)?;
        self.expect(Token::RParen)?;
        let alias = if self.eat_keyword("AS") {
            self.ident()?
        } else {
            String::from("count")
        };
        Ok(SelectItem::Count { alias })
    }

    fn where_clause(&mut self) -> Result<Option<Predicate>> {
        if self.eat_keyword("WHERE") {
            self.predicate().map(Some)
        } else {
            Ok(None)
        }
    }

    fn predicate(&mut self) -> Result<Predicate> {
        let mut pred = self.condition()?;
        while self.eat_keyword("AND") {
            pred = pred.and(self.condition()?);
        }
        Ok(pred)
    }

    fn condition(&mut self) -> Result<Predicate> {
        if self.eat(&Token::LParen) {
            let inner = self.predicate()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        let column = self.ident()?;
        if self.eat(&Token::Eq) {
            Ok(Predicate::eq(column, self.operand()?))
        } else if self.eat_keyword("LIKE") {
            Ok(Predicate::like(column, self.operand()?))
        } else {
            self.error("'=' or LIKE")
        }
    }

    fn operand(&mut self) -> Result<Operand> {
        let value = match self.peek() {
            Token::Param(p) => {
                let p = p.clone();
                self.bump();
                return Ok(Operand::Param(p));
            }
            Token::Str(s) => Value::String(s.clone()),
            Token::Int(i) => Value::Int64(*i),
            Token::Float(f) => Value::Float64(*f),
            t if t.is_keyword("NULL") => Value::Null,
            t if t.is_keyword("TRUE") => Value::Boolean(true),
            t if t.is_keyword("FALSE") => Value::Boolean(false),
            _ => return self.error("literal or parameter"),
        };
        self.bump();
        Ok(Operand::Literal(value))
    }

    fn insert(&mut self) -> Result<InsertStatement> {
        self.expect_keyword("INTO")?;
        let table = self.ident()?;
        self.expect(Token::LParen)?;
        let columns = self.ident_list()?;
        self.expect(Token::RParen)?;
        self.expect_keyword("VALUES")?;
        let values_at = self.position();
        self.expect(Token::LParen)?;
        let mut values = alloc::vec![self.operand()?];
        while self.eat(&Token::Comma) {
            values.push(self.operand()?);
        }
        self.expect(Token::RParen)?;
        if values.len() != columns.len() {
            return Err(Error::parse(
                format!(
                    "INSERT lists {} columns but {} values",
                    columns.len(),
                    values.len()
                ),
                values_at,
            ));
        }
        Ok(InsertStatement {
            table,
            columns,
            values,
        })
    }

    fn update(&mut self) -> Result<UpdateStatement> {
        let table = self.ident()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.ident()?;
            self.expect(Token::Eq)?;
            assignments.push((column, self.operand()?));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let predicate = self.where_clause()?;
        Ok(UpdateStatement {
            table,
            assignments,
            predicate,
        })
    }

    fn delete(&mut self) -> Result<DeleteStatement> {
        self.expect_keyword("FROM")?;
        let table = self.ident()?;
        let predicate = self.where_clause()?;
        Ok(DeleteStatement { table, predicate })
    }

    fn create_table(&mut self) -> Result<Statement> {
        self.expect_keyword("TABLE")?;
        let name = self.ident()?;
        let mut builder = TableBuilder::new(name)?;
        let mut primary_key = None;
        self.expect(Token::LParen)?;
        loop {
            let column_at = self.position();
            let column = self.ident()?;
            let type_at = self.position();
            let type_name = self.ident()?;
            let data_type = DataType::from_sql_name(&type_name).ok_or_else(|| {
                Error::parse(format!("Unknown column type {}", type_name), type_at)
            })?;
            let mut nullable = true;
            loop {
                if self.eat_keyword("PRIMARY") {
                    self.expect_keyword("KEY")?;
                    if primary_key.is_some() {
                        return Err(Error::parse("Table has more than one primary key", column_at));
                    }
                    primary_key = Some(column.clone());
                } else if self.eat_keyword("NOT") {
                    self.expect_keyword("NULL")?;
                    nullable = false;
                } else if !self.eat_keyword("NULL") {
                    break;
                }
            }
            builder = builder.add(Column::new(column, data_type).nullable(nullable))?;
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        let primary_key = match primary_key {
            Some(pk) => pk,
            None => return Err(Error::invalid_schema("Table has no primary key")),
        };
        builder.primary_key(&primary_key)?.build().map(Statement::CreateTable)
    }
}

/// Words that can never be identifiers.
fn is_reserved(word: &str) -> bool {
    const RESERVED: &[&str] = &[
        "SELECT", "FROM", "WHERE", "AND", "LIKE", "GROUP", "ORDER", "BY", "INSERT", "INTO",
        "VALUES", "UPDATE", "SET", "DELETE", "CREATE", "TABLE", "NULL", "TRUE", "FALSE",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}
