mod basic;
mod install;
mod lock;
mod utils;
