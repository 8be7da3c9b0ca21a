// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::process::exit;

use structopt::StructOpt;

use varcall_core::cli::{run, Varcall};

fn main() {
    let opt = Varcall::from_args();
    exit(match run(opt) {
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
        Ok(()) => 0,
    })
}
