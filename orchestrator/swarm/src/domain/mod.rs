// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Domain Layer
//!
//! Pure lifecycle types. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`member`] | `IdentityPhase`, `FleetMember`, `MemberSnapshot` |

pub mod member;

pub use member::*;
