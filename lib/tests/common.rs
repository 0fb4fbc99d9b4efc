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

use rsvn_lib::client::ClientContext;
use testutils::TestCheckout;
use testutils::TestRepos;
use testutils::TestWc;

pub const REPO_URL: &str = "svn://example.com/repo";

/// One repository, one working copy, one checkout seam.
pub struct TestEnv {
    pub repos: TestRepos,
    pub wc: TestWc,
    pub checkout: TestCheckout,
}

impl TestEnv {
    pub fn new() -> Self {
        let repos = TestRepos::new(REPO_URL);
        let wc = TestWc::new();
        let checkout = TestCheckout::new(&repos, &wc);
        Self {
            repos,
            wc,
            checkout,
        }
    }

    pub fn context(&self) -> ClientContext<'_> {
        ClientContext::new(&self.repos, &self.wc, &self.checkout)
    }
}
