mod common;

mod test_copy_args;
mod test_repos_to_wc;
mod test_wc_to_repos;
