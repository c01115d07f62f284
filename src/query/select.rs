//! Point and list statements
//!
//! Statements reduce stored rows to the latest live row per id the same way
//! the latest views do, but push filters below the reduction where that
//! cannot change the answer:
//!
//! - collapsing and immutable layouts take every filter before the reduction
//! - plain mutable and aggregation layouts only take the chain and id
//!   filters there; field filters run on the unpacked latest row so a stale
//!   version never matches

use crate::codec::{meta, EntityCodec};
use crate::ddl::{latest, Layout};
use crate::sql::{quote_ident, SqlValue};

/// A filter clause ready for placement
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub sql: String,
    pub args: Vec<SqlValue>,
    pub on_id: bool,
}

impl Clause {
    pub fn new(sql: impl Into<String>, args: Vec<SqlValue>, on_id: bool) -> Self {
        Self {
            sql: sql.into(),
            args,
            on_id,
        }
    }
}

/// Statement text plus its parameters in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

/// Builds read statements for one entity layout
pub struct SelectBuilder<'a> {
    codec: &'a EntityCodec,
    layout: &'a Layout,
    window: bool,
}

impl<'a> SelectBuilder<'a> {
    pub fn new(codec: &'a EntityCodec, layout: &'a Layout, window: bool) -> Self {
        Self { codec, layout, window }
    }

    /// Live latest rows of a chain matching every clause, ordered by id
    pub fn list(&self, chain: &str, clauses: &[Clause], limit: Option<usize>) -> Statement {
        let mut statement = self.live(chain, clauses);
        statement.sql.push_str(&format!(" ORDER BY {}", quote_ident(meta::ID)));
        if let Some(limit) = limit {
            statement.sql.push_str(&format!(" LIMIT {}", limit));
        }
        statement
    }

    pub fn count(&self, chain: &str, clauses: &[Clause]) -> Statement {
        let live = self.live(chain, clauses);
        Statement {
            sql: format!("SELECT count() AS count FROM ({})", live.sql),
            args: live.args,
        }
    }

    pub fn all_ids(&self, chain: &str) -> Statement {
        let live = self.live(chain, &[]);
        Statement {
            sql: format!(
                "SELECT {id} FROM ({rows}) ORDER BY {id}",
                id = quote_ident(meta::ID),
                rows = live.sql
            ),
            args: live.args,
        }
    }

    pub fn max_id(&self, chain: &str) -> Statement {
        let live = self.live(chain, &[]);
        Statement {
            sql: format!(
                "SELECT {id} FROM ({rows}) ORDER BY {id} DESC LIMIT 1",
                id = quote_ident(meta::ID),
                rows = live.sql
            ),
            args: live.args,
        }
    }

    fn live(&self, chain: &str, clauses: &[Clause]) -> Statement {
        let chain_clause = Clause::new(
            format!("{} = ?", quote_ident(meta::CHAIN)),
            vec![SqlValue::String(chain.to_string())],
            false,
        );
        let early_only_id = matches!(self.layout, Layout::Plain { .. } | Layout::Aggregation { .. });
        let (early, late): (Vec<&Clause>, Vec<&Clause>) = clauses.iter().partition(|c| !early_only_id || c.on_id);

        let mut inner = vec![chain_clause.sql.clone()];
        let mut args = chain_clause.args.clone();
        for clause in &early {
            inner.push(clause.sql.clone());
            args.extend(clause.args.iter().cloned());
        }
        let mut outer = Vec::new();
        for clause in &late {
            outer.push(clause.sql.clone());
            args.extend(clause.args.iter().cloned());
        }

        let rows = self.layout.latest_rows(self.codec, self.window, &inner);
        Statement {
            sql: latest::live_rows(&rows, &outer),
            args,
        }
    }
}
