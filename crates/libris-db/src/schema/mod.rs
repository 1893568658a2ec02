//! The application's schema history.
//!
//! Append new migrations here with the next zero-padded prefix; never
//! renumber or edit a migration that has shipped.

mod books;
mod users;

pub use books::CreateBooksTable;
pub use users::CreateUsersTable;

use crate::migrations::{Migration, MigrationError, Migrator};

/// Every migration of the application, in no particular order.
pub fn migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(CreateUsersTable), Box::new(CreateBooksTable)]
}

/// A [`Migrator`] loaded with the full schema history.
pub fn migrator() -> Result<Migrator, MigrationError> {
    Migrator::with_migrations(migrations())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn history_is_ordered_and_unique() {
        let migrator = migrator().unwrap();
        assert_eq!(
            migrator.ids().collect::<Vec<_>>(),
            vec!["001_users", "002_books"]
        );
    }

    #[test]
    fn fresh_database_gets_seeded_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = migrator().unwrap().run(&mut conn).unwrap();

        assert_eq!(report.applied, vec!["001_users", "002_books"]);
        assert_eq!(count(&conn, "users"), 2);
        assert_eq!(count(&conn, "books"), 3);
        assert_eq!(count(&conn, "schema_migrations"), 2);
    }

    #[test]
    fn seeded_rows_have_expected_defaults() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrator().unwrap().run(&mut conn).unwrap();

        let role: String = conn
            .query_row(
                "SELECT role FROM users WHERE email = 'bob@example.com'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(role, "user");

        let author: String = conn
            .query_row(
                "SELECT author FROM books WHERE isbn = '9780451524935'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(author, "George Orwell");
    }

    #[test]
    fn unique_constraints_are_enforced() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrator().unwrap().run(&mut conn).unwrap();

        let dup = conn.execute(
            "INSERT INTO users (name, email, password) VALUES ('Eve', 'alice@example.com', 'x')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn revert_drops_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = migrator().unwrap();
        migrator.run(&mut conn).unwrap();

        migrator.revert(&mut conn, "002_books").unwrap();
        migrator.revert(&mut conn, "001_users").unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('users', 'books')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }
}
