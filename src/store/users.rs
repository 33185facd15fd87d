use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{NewUser, User};

/// Returned (inside `anyhow::Error`) when registering an email that is already taken.
#[derive(Debug, thiserror::Error)]
#[error("user already exists: {0}")]
pub struct EmailTaken(pub String);

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        password_hash: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Insert a new account. Emails are compared case-insensitively.
pub fn create_user(conn: &mut Connection, new_user: &NewUser<'_>) -> Result<User> {
    let email = new_user.email.trim().to_lowercase();
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![email],
        |row| row.get(0),
    )?;
    if exists {
        return Err(EmailTaken(email).into());
    }

    let id = super::new_id();
    let now = super::now();
    tx.execute(
        "INSERT INTO users (id, email, first_name, last_name, password_hash, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            email,
            new_user.first_name,
            new_user.last_name,
            new_user.password_hash,
            now
        ],
    )?;
    tx.commit()?;

    tracing::debug!(user = %id, "user created");

    Ok(User {
        id,
        email,
        first_name: new_user.first_name.to_string(),
        last_name: new_user.last_name.to_string(),
        password_hash: new_user.password_hash.to_string(),
        created_at: now,
    })
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser<'static> {
        NewUser {
            email: "Alice@Example.com",
            first_name: "Alice",
            last_name: "Liddell",
            password_hash: "$argon2id$stub",
        }
    }

    #[test]
    fn create_and_find_user() {
        let mut conn = crate::db::open_memory_database(8).unwrap();
        let user = create_user(&mut conn, &alice()).unwrap();
        assert_eq!(user.email, "alice@example.com");

        let by_email = find_user_by_email(&conn, "ALICE@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        let by_id = find_user_by_id(&conn, &user.id).unwrap().unwrap();
        assert_eq!(by_id.first_name, "Alice");
        assert_eq!(by_id.password_hash, "$argon2id$stub");
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let mut conn = crate::db::open_memory_database(8).unwrap();
        create_user(&mut conn, &alice()).unwrap();

        let err = create_user(&mut conn, &alice()).unwrap_err();
        assert!(err.downcast_ref::<EmailTaken>().is_some());
    }

    #[test]
    fn unknown_user_is_none() {
        let conn = crate::db::open_memory_database(8).unwrap();
        assert!(find_user_by_email(&conn, "nobody@example.com").unwrap().is_none());
        assert!(find_user_by_id(&conn, "missing").unwrap().is_none());
    }
}
