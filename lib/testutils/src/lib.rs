// Copyright 2024 The Rsvn Authors
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

//! Collaborator fakes for exercising the rsvn client core: an in-memory
//! repository with a repository-access session and commit editor, and a
//! working copy over a temporary directory.

#![allow(missing_docs)]

pub mod repos;
pub mod wc;

pub use repos::EditOp;
pub use repos::TestRaSession;
pub use repos::TestRepos;
pub use wc::TestCheckout;
pub use wc::TestWc;

pub fn new_temp_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("rsvn-test-")
        .tempdir()
        .unwrap()
}
