// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Nexus AI CLI

pub mod chat;
pub mod config;
pub mod providers;
pub mod serve;

pub use self::chat::ChatArgs;
pub use self::config::ConfigCommand;
pub use self::providers::ProvidersCommand;
pub use self::serve::ServeArgs;
