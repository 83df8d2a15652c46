//! In-memory store for tests.
//!
//! Interprets exactly the statements the reconciliation emits (key listing,
//! counting, `SELECT ... IN`, single-row `INSERT` and `UPDATE`, table listing)
//! in either dialect, and stores every cell as text like a real client returns
//! it. Faults can be injected per statement pattern.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::StoreKind;
use crate::core::traits::{Dialect, QueryOutput, Store};
use crate::drivers::DialectImpl;
use crate::error::{ReconcileError, Result};

type Cells = Vec<Option<String>>;

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<String>,
    key: String,
    rows: Vec<Cells>,
}

impl MemTable {
    fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    fn key_index(&self) -> usize {
        self.index(&self.key).unwrap_or(0)
    }
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, MemTable>,
    statements: Vec<String>,
    rejections: Vec<(String, String)>,
    delays: Vec<(String, Duration)>,
    unavailable_after: Option<usize>,
    executed: usize,
}

/// In-memory [`Store`] with a minimal statement interpreter.
pub struct MemoryStore {
    name: String,
    dialect: DialectImpl,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Empty store speaking the given dialect.
    pub fn new(name: &str, kind: StoreKind) -> Self {
        Self {
            name: name.to_string(),
            dialect: DialectImpl::from_kind(kind),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Empty MySQL-dialect store.
    pub fn mysql(name: &str) -> Self {
        Self::new(name, StoreKind::Mysql)
    }

    /// Empty PostgreSQL-dialect store.
    pub fn postgres(name: &str) -> Self {
        Self::new(name, StoreKind::Postgres)
    }

    /// Add an empty table.
    pub fn with_table(self, name: &str, key: &str, columns: &[&str]) -> Self {
        self.inner.lock().unwrap().tables.insert(
            name.to_string(),
            MemTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                key: key.to_string(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Add rows to a table, cells in column order.
    pub fn with_rows(self, table: &str, rows: &[Vec<Option<&str>>]) -> Self {
        for row in rows {
            self.insert_row(table, row);
        }
        self
    }

    /// Insert one row directly, bypassing the interpreter.
    pub fn insert_row(&self, table: &str, cells: &[Option<&str>]) {
        let mut inner = self.inner.lock().unwrap();
        let table = inner.tables.get_mut(table).expect("unknown table");
        table
            .rows
            .push(cells.iter().map(|c| c.map(str::to_string)).collect());
    }

    /// Reject statements containing `pattern` with a store error.
    pub fn reject_when(&self, pattern: &str, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .rejections
            .push((pattern.to_string(), message.to_string()));
    }

    /// Delay statements containing `pattern`.
    pub fn delay_when(&self, pattern: &str, delay: Duration) {
        self.inner
            .lock()
            .unwrap()
            .delays
            .push((pattern.to_string(), delay));
    }

    /// Become unavailable after `n` more statements.
    pub fn unavailable_after(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.unavailable_after = Some(inner.executed + n);
    }

    /// Statements received so far.
    pub fn statements(&self) -> Vec<String> {
        self.inner.lock().unwrap().statements.clone()
    }

    /// Key cells of a table, in insertion order.
    pub fn keys(&self, table: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let table = &inner.tables[table];
        let key = table.key_index();
        table
            .rows
            .iter()
            .filter_map(|row| row[key].clone())
            .collect()
    }

    /// Row with the given key cell.
    pub fn row(&self, table: &str, key: &str) -> Option<Vec<Option<String>>> {
        let inner = self.inner.lock().unwrap();
        let table = &inner.tables[table];
        let index = table.key_index();
        table
            .rows
            .iter()
            .find(|row| row[index].as_deref() == Some(key))
            .cloned()
    }

    /// Number of rows in a table.
    pub fn count(&self, table: &str) -> usize {
        self.inner.lock().unwrap().tables[table].rows.len()
    }

    fn interpret(&self, inner: &mut Inner, sql: &str) -> Result<QueryOutput> {
        if sql == "SELECT 1" {
            return Ok(QueryOutput::new(
                vec!["1".to_string()],
                vec![vec![Some("1".to_string())]],
            ));
        }
        if sql == self.dialect.list_tables_query() {
            return Ok(QueryOutput::new(
                vec!["table_name".to_string()],
                inner
                    .tables
                    .keys()
                    .map(|name| vec![Some(name.clone())])
                    .collect(),
            ));
        }

        let tokens = tokenize(sql, &self.dialect)?;
        let mut parser = Parser { tokens, pos: 0 };
        match parser.word()?.to_ascii_uppercase().as_str() {
            "SELECT" => select(inner, &mut parser),
            "INSERT" => insert(inner, &mut parser),
            "UPDATE" => update(inner, &mut parser),
            other => Err(ReconcileError::rejected(format!(
                "ERROR: unsupported statement {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryOutput> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.statements.push(sql.to_string());
            if let Some(limit) = inner.unavailable_after {
                if inner.executed >= limit {
                    return Err(ReconcileError::unavailable(&self.name, "connection refused"));
                }
            }
            inner.executed += 1;
            inner
                .delays
                .iter()
                .find(|(pattern, _)| sql.contains(pattern.as_str()))
                .map(|(_, delay)| *delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some((_, message)) = inner
            .rejections
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Err(ReconcileError::rejected(message.clone()));
        }
        self.interpret(&mut inner, sql)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Word(String),
    Punct(char),
}

fn tokenize(sql: &str, dialect: &DialectImpl) -> Result<Vec<Token>> {
    let ident_quote = match dialect {
        DialectImpl::Mysql(_) => '`',
        DialectImpl::Postgres(_) => '"',
    };
    let mysql = matches!(dialect, DialectImpl::Mysql(_));
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == ident_quote {
            let mut name = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    Some(&q) if q == ident_quote && chars.get(i + 1) == Some(&ident_quote) => {
                        name.push(q);
                        i += 2;
                    }
                    Some(&q) if q == ident_quote => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        name.push(other);
                        i += 1;
                    }
                    None => return Err(ReconcileError::rejected("ERROR: unterminated identifier")),
                }
            }
            tokens.push(Token::Ident(name));
        } else if c == '\'' || (!mysql && (c == 'E' || c == 'e') && chars.get(i + 1) == Some(&'\'')) {
            let start = i;
            let backslash_escapes = mysql || c != '\'';
            i += if c == '\'' { 1 } else { 2 };
            loop {
                match chars.get(i) {
                    Some('\\') if backslash_escapes => i += 2,
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => i += 2,
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                    None => return Err(ReconcileError::rejected("ERROR: unterminated string")),
                }
            }
            let raw: String = chars[start..i].iter().collect();
            let value = dialect
                .decode_text(&raw)
                .ok_or_else(|| ReconcileError::rejected(format!("ERROR: bad literal {}", raw)))?;
            tokens.push(Token::Str(value));
        } else if "(),=*;".contains(c) {
            tokens.push(Token::Punct(c));
            i += 1;
        } else {
            let start = i;
            while i < chars.len()
                && !chars[i].is_whitespace()
                && !"(),=*;'".contains(chars[i])
                && chars[i] != ident_quote
            {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn word(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(syntax(format!("expected keyword, got {:?}", other))),
        }
    }

    fn keyword(&mut self, expected: &str) -> Result<()> {
        let word = self.word()?;
        if word.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(syntax(format!("expected {}, got {}", expected, word)))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(name)) | Some(Token::Word(name)) => Ok(name),
            other => Err(syntax(format!("expected identifier, got {:?}", other))),
        }
    }

    fn punct(&mut self, expected: char) -> Result<()> {
        match self.next() {
            Some(Token::Punct(c)) if c == expected => Ok(()),
            other => Err(syntax(format!("expected {:?}, got {:?}", expected, other))),
        }
    }

    fn eat_punct(&mut self, expected: char) -> bool {
        if self.peek() == Some(&Token::Punct(expected)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn literal(&mut self) -> Result<Option<String>> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Some(s)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(None),
            Some(Token::Word(w)) if w.parse::<f64>().is_ok() => Ok(Some(w)),
            other => Err(syntax(format!("expected literal, got {:?}", other))),
        }
    }

    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        self.punct('(')?;
        let mut items = vec![item(self)?];
        while self.eat_punct(',') {
            items.push(item(self)?);
        }
        self.punct(')')?;
        Ok(items)
    }

    fn end(&mut self) -> Result<()> {
        self.eat_punct(';');
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(syntax(format!("unexpected {:?}", token))),
        }
    }
}

fn syntax(message: String) -> ReconcileError {
    ReconcileError::rejected(format!("ERROR: syntax error: {}", message))
}

fn table<'a>(inner: &'a mut Inner, name: &str) -> Result<&'a mut MemTable> {
    inner.tables.get_mut(name).ok_or_else(|| {
        ReconcileError::rejected(format!("ERROR: relation \"{}\" does not exist", name))
    })
}

fn column(table: &MemTable, name: &str) -> Result<usize> {
    table.index(name).ok_or_else(|| {
        ReconcileError::rejected(format!("ERROR: column \"{}\" does not exist", name))
    })
}

fn sort_key(cell: &Option<String>) -> (u8, i64, String) {
    match cell.as_deref().map(|c| (c, c.parse::<i64>())) {
        Some((_, Ok(n))) => (0, n, String::new()),
        Some((c, Err(_))) => (1, 0, c.to_string()),
        None => (2, 0, String::new()),
    }
}

fn select(inner: &mut Inner, p: &mut Parser) -> Result<QueryOutput> {
    // SELECT COUNT(*) FROM t
    if matches!(p.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case("COUNT")) {
        p.pos += 1;
        p.punct('(')?;
        p.punct('*')?;
        p.punct(')')?;
        p.keyword("FROM")?;
        let name = p.ident()?;
        p.end()?;
        let count = table(inner, &name)?.rows.len();
        return Ok(QueryOutput::new(
            vec!["count".to_string()],
            vec![vec![Some(count.to_string())]],
        ));
    }

    let mut columns = vec![p.ident()?];
    while p.eat_punct(',') {
        columns.push(p.ident()?);
    }
    p.keyword("FROM")?;
    let name = p.ident()?;
    let table = table(inner, &name)?;
    let indexes = columns
        .iter()
        .map(|c| column(table, c))
        .collect::<Result<Vec<_>>>()?;

    let mut rows: Vec<&Cells> = table.rows.iter().collect();
    match p.word()?.to_ascii_uppercase().as_str() {
        "ORDER" => {
            p.keyword("BY")?;
            let order = column(table, &p.ident()?)?;
            p.end()?;
            rows.sort_by_key(|row| sort_key(&row[order]));
        }
        "WHERE" => {
            let filter = column(table, &p.ident()?)?;
            p.keyword("IN")?;
            let wanted = p.list(Parser::literal)?;
            p.end()?;
            rows.retain(|row| row[filter].is_some() && wanted.contains(&row[filter]));
        }
        other => return Err(syntax(format!("unexpected {}", other))),
    }

    Ok(QueryOutput::new(
        columns,
        rows.into_iter()
            .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
            .collect(),
    ))
}

fn insert(inner: &mut Inner, p: &mut Parser) -> Result<QueryOutput> {
    p.keyword("INTO")?;
    let name = p.ident()?;
    let columns = p.list(Parser::ident)?;
    p.keyword("VALUES")?;
    let values = p.list(Parser::literal)?;
    p.end()?;

    if columns.len() != values.len() {
        return Err(syntax("column and value counts differ".to_string()));
    }

    let table = table(inner, &name)?;
    let mut row: Cells = vec![None; table.columns.len()];
    for (name, value) in columns.iter().zip(values) {
        row[column(table, name)?] = value;
    }

    let key = table.key_index();
    if row[key].is_none() {
        return Err(ReconcileError::rejected(format!(
            "ERROR: null value in column \"{}\"",
            table.key
        )));
    }
    if table.rows.iter().any(|existing| existing[key] == row[key]) {
        return Err(ReconcileError::rejected(format!(
            "ERROR: duplicate key value violates unique constraint \"{}_pkey\"",
            name
        )));
    }

    table.rows.push(row);
    Ok(QueryOutput::empty())
}

fn update(inner: &mut Inner, p: &mut Parser) -> Result<QueryOutput> {
    let name = p.ident()?;
    p.keyword("SET")?;
    let mut assignments = Vec::new();
    loop {
        let column = p.ident()?;
        p.punct('=')?;
        assignments.push((column, p.literal()?));
        if !p.eat_punct(',') {
            break;
        }
    }
    p.keyword("WHERE")?;
    let filter = p.ident()?;
    p.punct('=')?;
    let key = p.literal()?;
    p.end()?;

    let table = table(inner, &name)?;
    let filter = column(table, &filter)?;
    let assignments = assignments
        .into_iter()
        .map(|(c, v)| Ok((column(table, &c)?, v)))
        .collect::<Result<Vec<_>>>()?;

    for row in table.rows.iter_mut().filter(|row| row[filter] == key) {
        for (index, value) in &assignments {
            row[*index] = value.clone();
        }
    }
    Ok(QueryOutput::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnKind, ColumnSpec};
    use crate::core::value::KeyValue;

    fn store() -> MemoryStore {
        MemoryStore::postgres("target")
            .with_table("ak_mangas", "id_manga", &["id_manga", "titre"])
            .with_rows(
                "ak_mangas",
                &[vec![Some("3"), Some("c")], vec![Some("1"), Some("it's")]],
            )
    }

    #[tokio::test]
    async fn test_list_keys_and_count() {
        let store = store();
        let key = ColumnSpec::new("id_manga", ColumnKind::Integer);
        let keys = store.list_keys("ak_mangas", &key).await.unwrap();
        assert_eq!(keys, vec![KeyValue::Int(1), KeyValue::Int(3)]);
        assert_eq!(store.row_count("ak_mangas").await.unwrap(), 2);
        assert_eq!(
            store.list_tables().await.unwrap().into_iter().collect::<Vec<_>>(),
            vec!["ak_mangas"]
        );
    }

    #[tokio::test]
    async fn test_insert_update_select() {
        let store = store();
        store
            .execute_query("INSERT INTO \"ak_mangas\" (\"id_manga\", \"titre\") VALUES (2, E'a\\\\b''c')")
            .await
            .unwrap();
        assert_eq!(
            store.row("ak_mangas", "2").unwrap()[1].as_deref(),
            Some("a\\b'c")
        );

        store
            .execute_query("UPDATE \"ak_mangas\" SET \"titre\" = NULL WHERE \"id_manga\" = 2")
            .await
            .unwrap();
        assert_eq!(store.row("ak_mangas", "2").unwrap()[1], None);

        let out = store
            .execute_query("SELECT \"titre\" FROM \"ak_mangas\" WHERE \"id_manga\" IN (1, 2)")
            .await
            .unwrap();
        assert_eq!(out.rows, vec![vec![Some("it's".to_string())], vec![None]]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = store();
        let err = store
            .execute_query("INSERT INTO \"ak_mangas\" (\"id_manga\", \"titre\") VALUES (1, 'x')")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::RowExecution { .. }));
    }

    #[tokio::test]
    async fn test_faults() {
        let store = store();
        store.reject_when("'boom'", "ERROR: boom");
        let err = store
            .execute_query("INSERT INTO \"ak_mangas\" (\"id_manga\", \"titre\") VALUES (9, 'boom')")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::RowExecution { .. }));

        store.unavailable_after(1);
        store.ping().await.unwrap();
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, ReconcileError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_mysql_dialect_literals() {
        let store = MemoryStore::mysql("source")
            .with_table("smf_topics", "ID_TOPIC", &["ID_TOPIC", "subject"]);
        store
            .execute_query("INSERT INTO `smf_topics` (`ID_TOPIC`, `subject`) VALUES (1, 'C:\\\\dir ''x''')")
            .await
            .unwrap();
        assert_eq!(
            store.row("smf_topics", "1").unwrap()[1].as_deref(),
            Some("C:\\dir 'x'")
        );
    }
}
