/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Control-plane layer.
//!
//! Owns per-identity channel state and the channel lifecycle: opening a channel,
//! watching it, refreshing it after an unexpected close and tearing it down on
//! request. The readiness flag kept here decides whether a lost channel is
//! recovered or left alone.

pub(crate) mod channel_lifecycle;
pub(crate) mod channel_registry;
