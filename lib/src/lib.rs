// Copyright 2023 The Rsvn Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Client library for rsvn, a client for Subversion-model centralized
//! version control.
//!
//! The library currently covers the copy/move dispatch core: the
//! [`copy::copy`] and [`copy::move_path`] operations over every combination
//! of working-copy and repository endpoints. The repository-access
//! transport, the working-copy administrative layer and recursive checkout
//! are consumed through the trait seams in [`ra`], [`wc`] and [`client`].

#![warn(missing_docs)]
#![deny(unused_must_use)]

pub mod client;
pub mod commit;
pub mod copy;
pub mod delta;
pub mod error;
pub mod mergeinfo;
pub mod paths;
pub mod ra;
pub mod revision;
pub mod wc;
