pub mod invalidate;
pub mod unify;
