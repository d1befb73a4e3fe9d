// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Nexus AI Gateway
//!
//! Tenant-scoped AI provider gateway for the Nexus TimeBank platform.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Provider adapters, settings resolution, ordered fallback,
//!   usage quotas and the HTTP surface that exposes them

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;
