//! Helpers shared by unit tests.

use yrs::{Doc, GetString, ReadTxn, Text, Transact, WriteTxn};

/// Append `content` to the doc's `content` text and return the delta.
pub fn edit(doc: &Doc, content: &str) -> Vec<u8> {
    let before = doc.transact().state_vector();
    {
        let mut txn = doc.transact_mut();
        let text = txn.get_or_insert_text("content");
        let len = text.get_string(&txn).len() as u32;
        text.insert(&mut txn, len, content);
    }
    doc.transact().encode_state_as_update_v1(&before)
}

/// Current `content` text of a doc.
pub fn text_of(doc: &Doc) -> String {
    let txn = doc.transact();
    txn.get_text("content")
        .map(|t| t.get_string(&txn))
        .unwrap_or_default()
}
