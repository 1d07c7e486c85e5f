//! Invitation query functions.

use rusqlite::Connection;

use crate::{DbError, Result};

/// A raw invitation row. Key material stays hex-encoded; callers in the
/// protocol layer decode what they need.
#[derive(Clone, Debug)]
pub struct InvitationRow {
    pub id: i64,
    pub code: String,
    pub petname: String,
    pub invite_key: String,
    pub invite_id: String,
    pub my_temp_privkey: String,
    pub my_signing_key: String,
    pub their_temp_pubkey: Option<String>,
    pub my_channel_record: String,
    pub my_private_channel_data: String,
    pub my_messages: String,
    pub their_messages: String,
    pub next_expected_message: u32,
    pub addressbook_id: Option<i64>,
}

fn row_to_invitation(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvitationRow> {
    Ok(InvitationRow {
        id: row.get(0)?,
        code: row.get(1)?,
        petname: row.get(2)?,
        invite_key: row.get(3)?,
        invite_id: row.get(4)?,
        my_temp_privkey: row.get(5)?,
        my_signing_key: row.get(6)?,
        their_temp_pubkey: row.get(7)?,
        my_channel_record: row.get(8)?,
        my_private_channel_data: row.get(9)?,
        my_messages: row.get(10)?,
        their_messages: row.get(11)?,
        next_expected_message: row.get(12)?,
        addressbook_id: row.get(13)?,
    })
}

const COLUMNS: &str = "id, code, petname, invite_key, invite_id,
    my_temp_privkey, my_signing_key, their_temp_pubkey,
    my_channel_record, my_private_channel_data,
    my_messages, their_messages, next_expected_message, addressbook_id";

/// Load an invitation by row id.
pub fn load(conn: &Connection, id: i64) -> Result<InvitationRow> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM invitations WHERE id = ?1"),
        [id],
        row_to_invitation,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            DbError::NotFound(format!("invitation {id}"))
        }
        other => DbError::Sqlite(other),
    })
}

/// Find the row id of a pending invitation by its rendezvous channel name.
pub fn find_by_invite_id(conn: &Connection, invite_id: &str) -> Result<Option<i64>> {
    let mut stmt =
        conn.prepare("SELECT id FROM invitations WHERE invite_id = ?1 LIMIT 1")?;
    let mut rows = stmt.query([invite_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Whether an invitation with this rendezvous channel name already exists.
pub fn invite_id_in_use(conn: &Connection, invite_id: &str) -> Result<bool> {
    Ok(find_by_invite_id(conn, invite_id)?.is_some())
}

/// All pending rendezvous channel names, for startup re-subscription.
pub fn all_invite_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT invite_id FROM invitations")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory;

    fn seed(db: &mut crate::ObservableDb, invite_id: &str) -> i64 {
        db.insert(
            "INSERT INTO invitations
             (code, petname, invite_key, invite_id, my_temp_privkey, my_signing_key,
              my_channel_record, my_private_channel_data,
              my_messages, their_messages, next_expected_message)
             VALUES ('636f6465', 'pet', ?1, ?2, ?1, ?1, '{}', '{}', '', '', 1)",
            rusqlite::params!["00".repeat(32), invite_id],
            "invitations",
        )
        .expect("insert")
    }

    #[test]
    fn test_load_roundtrip() {
        let mut db = open_memory().expect("open");
        let id = seed(&mut db, "abcd");
        db.commit().expect("commit");

        let row = load(db.conn(), id).expect("load");
        assert_eq!(row.invite_id, "abcd");
        assert_eq!(row.next_expected_message, 1);
        assert!(row.their_temp_pubkey.is_none());
        assert!(row.addressbook_id.is_none());
        assert_eq!(row.my_messages, "");
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let db = open_memory().expect("open");
        assert!(matches!(
            load(db.conn(), 42),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_by_invite_id() {
        let mut db = open_memory().expect("open");
        let id = seed(&mut db, "abcd");
        db.commit().expect("commit");

        assert_eq!(
            find_by_invite_id(db.conn(), "abcd").expect("find"),
            Some(id)
        );
        assert_eq!(find_by_invite_id(db.conn(), "ffff").expect("find"), None);
        assert!(invite_id_in_use(db.conn(), "abcd").expect("in use"));
    }

    #[test]
    fn test_all_invite_ids() {
        let mut db = open_memory().expect("open");
        seed(&mut db, "aa");
        seed(&mut db, "bb");
        db.commit().expect("commit");

        let mut ids = all_invite_ids(db.conn()).expect("ids");
        ids.sort();
        assert_eq!(ids, vec!["aa".to_string(), "bb".to_string()]);
    }
}
