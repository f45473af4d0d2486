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

//! Data-plane layer.
//!
//! Establishes the delivery stream for an identity and runs its per-message
//! loop: body validation, webhook forwarding, response capture, the
//! acknowledge/reject decision and the audit record. Deliveries of one identity
//! are handled strictly in order by a single task.

pub(crate) mod consumer;
pub(crate) mod dispatch;
pub(crate) mod response_capture;
