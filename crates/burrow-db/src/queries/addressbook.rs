//! Address-book query functions.

use rusqlite::Connection;

use crate::{DbError, Result};

/// A raw address-book row. Key material stays hex-encoded.
#[derive(Clone, Debug)]
pub struct AddressbookEntry {
    pub id: i64,
    pub petname: String,
    pub acked: bool,
    pub my_signing_key: String,
    pub their_verify_key: String,
    pub my_cid_key: String,
    pub next_cid_token: Option<String>,
    pub their_channel_record_json: String,
    pub my_old_channel_privkey: String,
    pub my_new_channel_privkey: String,
    pub they_used_new_channel_key: bool,
    pub next_outbound_seqnum: u64,
    pub highest_inbound_seqnum: u64,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AddressbookEntry> {
    Ok(AddressbookEntry {
        id: row.get(0)?,
        petname: row.get(1)?,
        acked: row.get(2)?,
        my_signing_key: row.get(3)?,
        their_verify_key: row.get(4)?,
        my_cid_key: row.get(5)?,
        next_cid_token: row.get(6)?,
        their_channel_record_json: row.get(7)?,
        my_old_channel_privkey: row.get(8)?,
        my_new_channel_privkey: row.get(9)?,
        they_used_new_channel_key: row.get(10)?,
        next_outbound_seqnum: row.get::<_, i64>(11)? as u64,
        highest_inbound_seqnum: row.get::<_, i64>(12)? as u64,
    })
}

const COLUMNS: &str = "id, petname, acked, my_signing_key, their_verify_key,
    my_cid_key, next_cid_token, their_channel_record_json,
    my_old_channel_privkey, my_new_channel_privkey,
    they_used_new_channel_key, next_outbound_seqnum, highest_inbound_seqnum";

/// Get an address-book entry by id.
pub fn get(conn: &Connection, id: i64) -> Result<AddressbookEntry> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM addressbook WHERE id = ?1"),
        [id],
        row_to_entry,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            DbError::NotFound(format!("addressbook entry {id}"))
        }
        other => DbError::Sqlite(other),
    })
}

/// List every address-book entry.
pub fn list(conn: &Connection) -> Result<Vec<AddressbookEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM addressbook ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([], row_to_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The per-channel fields needed to trial-decrypt a `CIDBox`.
#[derive(Clone, Debug)]
pub struct CidScanRow {
    pub id: i64,
    pub my_cid_key: String,
    pub highest_inbound_seqnum: u64,
}

/// Scan every channel's CID key for inbound hint resolution.
pub fn scan_cid_keys(conn: &Connection) -> Result<Vec<CidScanRow>> {
    let mut stmt = conn
        .prepare("SELECT id, my_cid_key, highest_inbound_seqnum FROM addressbook")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CidScanRow {
                id: row.get(0)?,
                my_cid_key: row.get(1)?,
                highest_inbound_seqnum: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The dual decryption keys of one channel.
#[derive(Clone, Debug)]
pub struct ChannelKeyRow {
    pub id: i64,
    pub my_old_channel_privkey: String,
    pub my_new_channel_privkey: String,
}

/// Fetch decryption keys for one channel, or for every channel when no hint
/// narrowed the candidate set.
pub fn channel_keys(conn: &Connection, id: Option<i64>) -> Result<Vec<ChannelKeyRow>> {
    let map = |row: &rusqlite::Row<'_>| {
        Ok(ChannelKeyRow {
            id: row.get(0)?,
            my_old_channel_privkey: row.get(1)?,
            my_new_channel_privkey: row.get(2)?,
        })
    };
    let rows = match id {
        Some(id) => {
            let mut stmt = conn.prepare(
                "SELECT id, my_old_channel_privkey, my_new_channel_privkey
                 FROM addressbook WHERE id = ?1",
            )?;
            let result = stmt
                .query_map([id], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            result
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, my_old_channel_privkey, my_new_channel_privkey
                 FROM addressbook",
            )?;
            let result = stmt
                .query_map([], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            result
        }
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory;

    fn seed(db: &mut crate::ObservableDb, petname: &str) -> i64 {
        db.insert(
            "INSERT INTO addressbook
             (petname, acked, my_signing_key, their_verify_key, my_cid_key,
              their_channel_record_json,
              my_old_channel_privkey, my_new_channel_privkey)
             VALUES (?1, 0, ?2, ?2, ?2, '{}', ?2, ?2)",
            rusqlite::params![petname, "00".repeat(32)],
            "addressbook",
        )
        .expect("insert")
    }

    #[test]
    fn test_get_defaults() {
        let mut db = open_memory().expect("open");
        let id = seed(&mut db, "pal");
        db.commit().expect("commit");

        let entry = get(db.conn(), id).expect("get");
        assert_eq!(entry.petname, "pal");
        assert!(!entry.acked);
        assert!(!entry.they_used_new_channel_key);
        assert_eq!(entry.next_outbound_seqnum, 1);
        assert_eq!(entry.highest_inbound_seqnum, 0);
        assert!(entry.next_cid_token.is_none());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let db = open_memory().expect("open");
        assert!(matches!(get(db.conn(), 7), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_list_ordered_by_id() {
        let mut db = open_memory().expect("open");
        let a = seed(&mut db, "first");
        let b = seed(&mut db, "second");
        db.commit().expect("commit");

        let entries = list(db.conn()).expect("list");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, a);
        assert_eq!(entries[1].id, b);
    }

    #[test]
    fn test_scan_and_keylist() {
        let mut db = open_memory().expect("open");
        let a = seed(&mut db, "a");
        let b = seed(&mut db, "b");
        db.commit().expect("commit");

        let scan = scan_cid_keys(db.conn()).expect("scan");
        assert_eq!(scan.len(), 2);

        let all = channel_keys(db.conn(), None).expect("all keys");
        assert_eq!(all.len(), 2);
        let one = channel_keys(db.conn(), Some(b)).expect("one");
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, b);
        assert_ne!(one[0].id, a);
    }
}
