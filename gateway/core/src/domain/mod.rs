// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod ai_settings;
pub mod conversation;
pub mod friendly_error;
pub mod gateway_config;
pub mod llm;
pub mod repository;
pub mod tenant;
pub mod usage;
