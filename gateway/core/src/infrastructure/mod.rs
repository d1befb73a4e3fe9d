// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod llm;
pub mod prompt_template_engine;
pub mod repositories;
pub mod secret_box;
