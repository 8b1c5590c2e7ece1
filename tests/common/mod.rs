//! Common test utilities for the report tests
//!
//! Provides a small, fully known book collection so that expected counts
//! and orderings can be written down by hand.

#![allow(dead_code)]

use bookstore_reports::{Book, MemoryStore, QueryRunner};

pub const COLLECTION: &str = "books";

/// Twelve books with unique titles `Alpha` through `Lima`.
///
/// - `A. Kumar` has three books, no other author more than two
/// - four books are published strictly after 2015
/// - `Delta` is the cheapest (8.0), `Echo` the most expensive (30.0)
pub fn fixture_books() -> Vec<Book> {
    vec![
        Book::new("Alpha", "A. Kumar", "Fiction", 2016, 10.0, true),
        Book::new("Bravo", "A. Kumar", "Fiction", 2015, 20.0, false),
        Book::new("Charlie", "B. Lee", "Mystery", 2015, 15.0, true),
        Book::new("Delta", "C. Osei", "Fiction", 1999, 8.0, true),
        Book::new("Echo", "A. Kumar", "Science", 2021, 30.0, true),
        Book::new("Foxtrot", "B. Lee", "Mystery", 2011, 12.5, false),
        Book::new("Golf", "D. Park", "History", 1985, 25.0, true),
        Book::new("Hotel", "C. Osei", "Science", 2008, 18.0, true),
        Book::new("India", "E. Ruiz", "Fiction", 2019, 22.0, false),
        Book::new("Juliet", "D. Park", "History", 2010, 9.5, true),
        Book::new("Kilo", "E. Ruiz", "Science", 2003, 14.0, true),
        Book::new("Lima", "F. Diaz", "Fiction", 2020, 11.0, true),
    ]
}

pub fn empty_runner() -> QueryRunner<MemoryStore> {
    QueryRunner::new(MemoryStore::new(COLLECTION))
}

pub async fn seeded_runner() -> QueryRunner<MemoryStore> {
    let runner = empty_runner();
    let inserted = runner
        .insert_books(&fixture_books())
        .await
        .expect("Failed to seed store");
    assert_eq!(inserted, 12);
    runner
}

pub fn titles(books: &[Book]) -> Vec<String> {
    books.iter().filter_map(|b| b.title.clone()).collect()
}
