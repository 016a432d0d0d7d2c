// transcodine_core is the encrypted streaming storage core for Transcodine.
// Copyright (C) 2026  The Transcodine Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Crypto primitives and on-disk container formats backing Transcodine's
//! local secret storage: a hand-rolled AES-128/CTR/SHA-256/HMAC/PBKDF2
//! toolkit, a random-access cipher I/O stream, and the two on-disk formats
//! built on top of it (EDB64, an encrypted append-style key-value database,
//! and ARC64, a TAR-inspired encrypted bin archive).

mod error;
pub use error::*;

mod log;

pub mod bin;
pub mod constants;
pub mod crypto;
pub mod db;
pub mod fsutil;
pub mod iostream;
pub mod keys;
pub mod paths;
