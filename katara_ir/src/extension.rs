//! The extension hook spec.md §6 reserves for the source-language runtime's
//! four extra instruction kinds (shared/unique pointer lifecycle, string
//! operations, panics). The core parser calls into an
//! `ExtensionInstrParser` whenever it meets a mnemonic it does not
//! recognize as core; the core itself never constructs or inspects the
//! resulting `ExtInstr` payload beyond carrying it through.

use crate::representation::instr::ExtInstr;
use crate::representation::value::Value;
use crate::text::scanner::Token;
use katara_common::KataraResult;

/// Implemented by a language-specific extension to parse its reserved
/// mnemonics. The core ships `NoExtensions`, which rejects everything —
/// a core-only build of the IR format has no extension instructions.
pub trait ExtensionInstrParser {
    /// Whether `mnemonic` names one of this extension's instructions.
    fn recognizes(&self, mnemonic: &str) -> bool;

    /// Parses one extension instruction given its already-scanned
    /// mnemonic token and the raw argument tokens that followed it up to
    /// (not including) the terminating newline.
    fn parse(&self, mnemonic: &str, results: Vec<Token>, args: Vec<Value>) -> KataraResult<ExtInstr>;
}

/// The default extension: recognizes nothing. A core-only consumer of the
/// IR format plugs this in and gets a parse failure on any of the four
/// reserved mnemonics (`make_shared`, `copy_shared`, `delete_shared`,
/// `make_unique`, `delete_unique`, `str_index`, `str_concat`, `panic`).
pub struct NoExtensions;

impl ExtensionInstrParser for NoExtensions {
    fn recognizes(&self, _mnemonic: &str) -> bool {
        false
    }

    fn parse(&self, mnemonic: &str, _results: Vec<Token>, _args: Vec<Value>) -> KataraResult<ExtInstr> {
        Err(katara_common::KataraError::unknown_opcode(format!(
            "'{}' is not a core instruction and no extension parser is installed",
            mnemonic
        )))
    }
}

/// The reserved extension mnemonics named in spec.md §6, exposed so a
/// language-specific `ExtensionInstrParser` can recognize them without
/// duplicating the literal strings.
pub const RESERVED_EXT_MNEMONICS: &[&str] = &[
    "make_shared_ptr",
    "copy_shared_ptr",
    "delete_shared_ptr",
    "make_unique_ptr",
    "delete_unique_ptr",
    "str_index",
    "str_concat",
    "panic",
];
