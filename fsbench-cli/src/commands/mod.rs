// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod alloc;
pub mod clean;
pub mod sweep;
pub mod validate;
