use std::io::{self, BufRead, Write};

use rpool::{Handle, Result};

const HELP: &str = "\
Available Commands:
   alloc <size>            - Allocate a block of <size> bytes
   calloc <count> <size>   - Allocate <count> * <size> zeroed bytes
   aligned <size> <align>  - Allocate <size> bytes aligned to <align>
   realloc <addr> <size>   - Resize the block at <addr> (hex)
   free <addr>             - Free the block at <addr> (hex)
   freeall                 - Release every block at once
   leakcheck               - List blocks still in use
   stats                   - Show pool statistics
   map                     - Show the memory map
   defrag                  - Merge adjacent free blocks
   help                    - Show this help message
   exit                    - Exit the program";

/// Parses a hex address with or without the `0x` prefix.
fn parse_addr(text: &str) -> Option<Handle> {
  let digits = text.trim_start_matches("0x").trim_start_matches("0X");
  usize::from_str_radix(digits, 16).ok().map(Handle::from_addr)
}

fn parse_size(text: &str) -> Option<usize> {
  text.parse().ok()
}

fn report(result: Result<Handle>) {
  match result {
    Ok(handle) => println!("Allocated at {handle}"),
    Err(err) => println!("Error: {err}"),
  }
}

/// Runs one command line. Returns `false` when the shell should exit.
fn execute(tokens: &[&str]) -> bool {
  match tokens {
    ["alloc", size] => match parse_size(size) {
      Some(size) => report(rpool::allocate(size)),
      None => println!("Error: Invalid size value"),
    },
    ["calloc", count, size] => match (parse_size(count), parse_size(size)) {
      (Some(count), Some(size)) => report(rpool::allocate_zeroed(count, size)),
      _ => println!("Error: Invalid size value"),
    },
    ["aligned", size, alignment] => match (parse_size(size), parse_size(alignment)) {
      (Some(size), Some(alignment)) => report(rpool::allocate_aligned(size, alignment)),
      _ => println!("Error: Invalid size value"),
    },
    ["realloc", addr, size] => match (parse_addr(addr), parse_size(size)) {
      (Some(handle), Some(size)) => match rpool::resize(handle, size) {
        Ok(Some(moved)) => println!("Resized to {size} bytes at {moved}"),
        Ok(None) => println!("Freed {handle}"),
        Err(err) => println!("Error: {err}"),
      },
      _ => println!("Error: Usage: realloc <addr> <size>"),
    },
    ["free", addr] => match parse_addr(addr) {
      Some(handle) => match rpool::free(handle) {
        Ok(()) => println!("Freed {handle}"),
        Err(err) => println!("Error: {err}"),
      },
      None => println!("Error: Invalid address format"),
    },
    ["freeall"] => println!("Released {} blocks", rpool::free_all()),
    ["leakcheck"] => println!("{}", rpool::leak_check()),
    ["stats"] => println!("{}", rpool::stats()),
    ["map"] => println!("{}", rpool::show_memory_map()),
    ["defrag"] => println!("Merged {} block pairs", rpool::defragment()),
    ["help"] => println!("{HELP}"),
    ["exit"] | ["quit"] => {
      println!("Goodbye!");
      return false;
    }
    [command, ..] => {
      println!("Unknown command: {command}");
      println!("Type 'help' for available commands");
    }
    [] => {}
  }

  true
}

fn main() {
  rpool::logging::init();
  rpool::initialize_pool();

  println!("rpool shell - {} byte pool", rpool::global().capacity());
  println!("{HELP}\n");

  let stdin = io::stdin();

  loop {
    print!("allocator> ");
    let _ = io::stdout().flush();

    let mut line = String::new();

    match stdin.lock().read_line(&mut line) {
      Ok(0) | Err(_) => break,
      Ok(_) => {}
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();

    if !execute(&tokens) {
      break;
    }
  }
}
