mod cache_test;
mod helpers;
mod unify_test;
