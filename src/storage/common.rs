// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use crate::storage::StorageError;

pub fn validate_username(username: &str) -> Result<(), StorageError> {
    if username.is_empty() {
        return Err(StorageError::InvalidInput(
            "username must be non-empty".into(),
        ));
    }
    if username.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(StorageError::InvalidInput(
            "username cannot contain whitespace or /".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), StorageError> {
    if password.is_empty() {
        return Err(StorageError::InvalidInput(
            "password must be non-empty".into(),
        ));
    }
    Ok(())
}

pub fn validate_body(body: &str) -> Result<(), StorageError> {
    if body.trim().is_empty() {
        return Err(StorageError::InvalidInput("post body must be non-empty".into()));
    }
    Ok(())
}

/// Slug for a channel label: lowercase, spaces become underscores.
pub fn slugify(label: &str) -> String {
    label.replace(' ', "_").to_lowercase()
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'`.
pub fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
