//! The observable write path.
//!
//! Tracked writes (`insert`, `update`, `delete`) queue a [`Notice`] carrying
//! the post-image of the mutated row. `commit` commits the underlying
//! transaction first and only then pushes queued notices into subscriber
//! channels; subscribers drain them on a later turn of the scheduler, so an
//! observer can never see a pre-commit view and never reenters the store on
//! the write's own call stack.

use std::collections::HashMap;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::Result;

/// What a tracked write did to its row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeAction {
    Insert,
    Update,
    Delete,
}

/// A change notification, delivered after the mutating transaction commits.
#[derive(Clone, Debug)]
pub struct Notice {
    /// Table the write touched.
    pub table: String,
    /// Kind of write.
    pub action: NoticeAction,
    /// Row id.
    pub id: i64,
    /// Full post-image row for insert/update, `None` for delete (or when
    /// the row was removed later in the same transaction).
    pub new_value: Option<Value>,
}

/// A handle on a table subscription. Dropping the receiver (or calling
/// [`ObservableDb::unsubscribe`]) ends delivery.
pub struct Subscription {
    /// Token for explicit unsubscription.
    pub id: u64,
    /// Channel the notices arrive on.
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

/// The observable store. Owns the connection; all writers are serialized by
/// exclusive access.
pub struct ObservableDb {
    conn: Connection,
    observers: HashMap<String, Vec<(u64, mpsc::UnboundedSender<Notice>)>>,
    pending: Vec<Notice>,
    next_subscription: u64,
    in_txn: bool,
}

impl ObservableDb {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn,
            observers: HashMap::new(),
            pending: Vec::new(),
            next_subscription: 1,
            in_txn: false,
        }
    }

    /// Read access to the underlying connection. Writes must go through the
    /// tracked methods so they join the open transaction and queue notices.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_txn {
            self.conn.execute_batch("BEGIN")?;
            self.in_txn = true;
        }
        Ok(())
    }

    /// Untracked write (no notice queued). Joins the open transaction.
    pub fn execute<P: rusqlite::Params>(&mut self, sql: &str, params: P) -> Result<usize> {
        self.begin()?;
        Ok(self.conn.execute(sql, params)?)
    }

    /// Tracked insert. Returns the new row id and queues an insert notice
    /// with the row's post-image.
    pub fn insert<P: rusqlite::Params>(
        &mut self,
        sql: &str,
        params: P,
        table: &str,
    ) -> Result<i64> {
        self.begin()?;
        self.conn.execute(sql, params)?;
        let id = self.conn.last_insert_rowid();
        let new_value = self.row_json(table, id)?;
        self.pending.push(Notice {
            table: table.to_string(),
            action: NoticeAction::Insert,
            id,
            new_value,
        });
        Ok(id)
    }

    /// Tracked update. Queues an update notice with the row's post-image.
    pub fn update<P: rusqlite::Params>(
        &mut self,
        sql: &str,
        params: P,
        table: &str,
        id: i64,
    ) -> Result<()> {
        self.begin()?;
        self.conn.execute(sql, params)?;
        let new_value = self.row_json(table, id)?;
        self.pending.push(Notice {
            table: table.to_string(),
            action: NoticeAction::Update,
            id,
            new_value,
        });
        Ok(())
    }

    /// Tracked delete. Queues a delete notice without a post-image.
    pub fn delete<P: rusqlite::Params>(
        &mut self,
        sql: &str,
        params: P,
        table: &str,
        id: i64,
    ) -> Result<()> {
        self.begin()?;
        self.conn.execute(sql, params)?;
        self.pending.push(Notice {
            table: table.to_string(),
            action: NoticeAction::Delete,
            id,
            new_value: None,
        });
        Ok(())
    }

    /// Durably commit the open transaction, then hand the queued notices to
    /// subscribers. Delivery rides unbounded channels: observers run when
    /// they next drain their subscription, on a later scheduler turn.
    pub fn commit(&mut self) -> Result<()> {
        if self.in_txn {
            self.conn.execute_batch("COMMIT")?;
            self.in_txn = false;
        }
        let pending = std::mem::take(&mut self.pending);
        for notice in pending {
            if let Some(subs) = self.observers.get_mut(&notice.table) {
                subs.retain(|(_, tx)| tx.send(notice.clone()).is_ok());
            }
        }
        Ok(())
    }

    /// Abandon the open transaction and every notice queued under it.
    pub fn rollback(&mut self) -> Result<()> {
        if self.in_txn {
            self.conn.execute_batch("ROLLBACK")?;
            self.in_txn = false;
        }
        self.pending.clear();
        Ok(())
    }

    /// Begin observing a table. Notices for commits after this call arrive
    /// on the returned channel.
    pub fn subscribe(&mut self, table: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.observers
            .entry(table.to_string())
            .or_default()
            .push((id, tx));
        Subscription { id, notices: rx }
    }

    /// Stop observing a table.
    pub fn unsubscribe(&mut self, table: &str, subscription_id: u64) {
        if let Some(subs) = self.observers.get_mut(table) {
            subs.retain(|(id, _)| *id != subscription_id);
        }
    }

    /// Fetch the full row as a JSON object, hex-encoding any blob columns.
    fn row_json(&self, table: &str, id: i64) -> Result<Option<Value>> {
        // Table names come from compile-time call sites, never from input.
        let sql = format!("SELECT * FROM {table} WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut map = serde_json::Map::new();
        for (i, name) in names.iter().enumerate() {
            let value = match row.get_ref(i)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(n) => Value::from(n),
                ValueRef::Real(f) => Value::from(f),
                ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => Value::String(hex::encode(b)),
            };
            map.insert(name.clone(), value);
        }
        Ok(Some(Value::Object(map)))
    }
}

impl std::fmt::Debug for ObservableDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableDb")
            .field("pending", &self.pending.len())
            .field("in_txn", &self.in_txn)
            .finish()
    }
}
