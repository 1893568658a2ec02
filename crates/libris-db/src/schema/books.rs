use rusqlite::{Transaction, params};

use crate::migrations::{BoxError, Migration};

const SEED_BOOKS: [(&str, &str, &str); 3] = [
    ("The Catcher in the Rye", "J.D. Salinger", "9780316769488"),
    ("To Kill a Mockingbird", "Harper Lee", "9780061120084"),
    ("1984", "George Orwell", "9780451524935"),
];

/// Creates the `books` table and seeds a starter catalogue.
pub struct CreateBooksTable;

impl Migration for CreateBooksTable {
    fn id(&self) -> &str {
        "002_books"
    }

    fn description(&self) -> &str {
        "create books table with starter catalogue"
    }

    fn apply(&self, tx: &Transaction<'_>) -> Result<(), BoxError> {
        tx.execute_batch(
            "CREATE TABLE books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                isbn TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;

        let mut insert =
            tx.prepare("INSERT INTO books (title, author, isbn) VALUES (?1, ?2, ?3)")?;
        for (title, author, isbn) in SEED_BOOKS {
            insert.execute(params![title, author, isbn])?;
        }
        Ok(())
    }

    fn revert(&self, tx: &Transaction<'_>) -> Result<(), BoxError> {
        tx.execute_batch("DROP TABLE IF EXISTS books;")?;
        Ok(())
    }
}
