// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! CLI command modules.

pub mod flavours;
pub mod run;
pub mod validate;
