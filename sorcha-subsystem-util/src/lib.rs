// This file is part of Sorcha.
//
// Sorcha is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Sorcha is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Sorcha.  If not, see <http://www.gnu.org/licenses/>.

//! Helpers shared by every core component crate: the storage capability
//! (§9 design note) and the retry/backoff primitive used wherever the
//! specification calls for "retry with backoff" rather than a bespoke
//! timer loop per component.

pub mod backoff;
pub mod storage;

pub use backoff::{Backoff, BackoffConfig};
pub use storage::{Storage, StorageError, StorageResult};
