// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate getset;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;

pub mod alignment;
pub mod calling;
pub mod cli;
pub mod config;
pub mod errors;
pub mod io;
pub mod likelihood;
pub mod mapping;
pub mod pipeline;
pub mod region_tree;
pub mod utils;
pub mod variants;
