// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// Pretty printers for reporting information.
use std::{borrow::Cow, sync::Mutex};

const VERTICAL: char = '│';
const UP_AND_RIGHT: char = '└';
const VERTICAL_AND_RIGHT: char = '├';

type Block = Vec<Cow<'static, str>>;

lazy_static::lazy_static! {
    static ref WARNINGS: Mutex<Vec<Block>> = Mutex::new(vec![]);
}

/// Pair every line of every block with the tree symbol that goes in front of
/// it. The first line of a block gets a branch; the very last block gets the
/// corner.
pub(super) fn tree_lines(blocks: &[Block]) -> Vec<(char, &str)> {
    let num_blocks = blocks.len();
    let mut lines = vec![];
    for (i_block, block) in blocks.iter().enumerate() {
        let last_block = i_block + 1 == num_blocks;
        let num_lines = block.len();
        for (i_line, line) in block.iter().enumerate() {
            let symbol = match (i_line, num_lines == 1 && last_block) {
                (0, true) => UP_AND_RIGHT,
                (0, false) => VERTICAL_AND_RIGHT,
                _ => VERTICAL,
            };
            lines.push((symbol, line.as_ref()));
        }
    }
    lines
}

/// A titled tree of information, e.g. the parameters a stage will run with.
pub(crate) struct InfoPrinter {
    title: Cow<'static, str>,
    blocks: Vec<Block>,
}

impl InfoPrinter {
    pub(crate) fn new(title: Cow<'static, str>) -> Self {
        Self {
            title,
            blocks: vec![],
        }
    }

    pub(crate) fn push_line(&mut self, line: Cow<'static, str>) {
        self.blocks.push(vec![line]);
    }

    pub(crate) fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub(crate) fn display(self) {
        log::info!("{}", console::style(self.title).bold());
        for (symbol, line) in tree_lines(&self.blocks) {
            log::info!("{symbol} {line}");
        }
        log::info!("");
    }
}

/// Things worth telling the user about while arguments are parsed. They're
/// held back and shown together by [`display_warnings`].
pub(crate) trait Warn {
    fn warn(self);
}

impl Warn for &'static str {
    fn warn(self) {
        WARNINGS.lock().unwrap().push(vec![self.into()]);
    }
}

impl Warn for String {
    fn warn(self) {
        WARNINGS.lock().unwrap().push(vec![self.into()]);
    }
}

impl Warn for Block {
    fn warn(self) {
        WARNINGS.lock().unwrap().push(self);
    }
}

/// Print out any warnings that have been collected as CLI arguments have been
/// parsed.
pub(crate) fn display_warnings() {
    let mut warnings = WARNINGS.lock().unwrap();
    log::debug!("Displaying warnings");
    if warnings.is_empty() {
        return;
    }

    log::warn!("{}", console::style("Warnings").bold());
    for (symbol, line) in tree_lines(&warnings) {
        log::warn!("{symbol} {line}");
    }
    log::warn!("");
    warnings.clear();
}

#[cfg(test)]
pub(super) fn take_warnings() -> Vec<Block> {
    std::mem::take(&mut *WARNINGS.lock().unwrap())
}
