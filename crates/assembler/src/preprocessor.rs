//! The preprocessor.
//!
//! One pass per file, ahead of parsing: strips `#` line comments and
//! expands the fixed macro table into real instruction text. Expansions stay
//! on the source line (`;`-separated) so line numbers survive into the
//! diagnostics of the later passes. A buffer with no macros and no comments
//! round-trips byte-identically.

use crate::configuration::Configuration;
use crate::diagnostics::Error;
use crate::scanner::{is_identifier_byte, Cursor};

/// The entry thunk: materialise `_start` and jump to it.
const ENTRY_THUNK: &str = "  movu r29, _start; movl r29, _start; br r29, r29\n";

/// Preprocess every source of the configuration, in order.
pub(crate) fn preprocess(configuration: &Configuration) -> Result<Vec<String>, Error> {
    let mut results = Vec::with_capacity(configuration.sources.len());

    for (index, source) in configuration.sources.iter().enumerate() {
        let mut result = String::with_capacity(source.text.len());

        if index == 0 && configuration.entry_thunk {
            result.push_str(ENTRY_THUNK);
        }

        expand_file(&source.path, &source.text, &mut result)?;
        results.push(result);
    }

    Ok(results)
}

fn expand_file(path: &str, text: &str, result: &mut String) -> Result<(), Error> {
    let mut cursor = Cursor::new(path, text);
    // Macro keywords are only recognized at word starts, so identifiers that
    // merely embed a macro name survive untouched.
    let mut word_start = true;

    loop {
        let byte = cursor.peek();
        if byte == 0 {
            break;
        }

        if byte == b'#' {
            while cursor.peek() != b'\n' && cursor.peek() != 0 {
                cursor.advance(1);
            }
            continue;
        }

        if word_start && expand_macro(&mut cursor, result)? {
            word_start = false;
            continue;
        }

        result.push(byte as char);
        word_start = !is_identifier_byte(byte);
        cursor.advance(1);
    }

    Ok(())
}

/// Expand one macro if the cursor sits on one. Returns whether an expansion
/// happened.
fn expand_macro(cursor: &mut Cursor<'_>, result: &mut String) -> Result<bool, Error> {
    if cursor.consume_keyword("nop") {
        result.push_str("and  r0, r0, r0");
    } else if cursor.consume_keyword("ret") {
        result.push_str("jmp  r29");
    } else if cursor.consume_keyword("push") || cursor.consume_keyword("pshw") {
        let ra = register_operand(cursor)?;
        result.push_str(&format!("swa  r{ra}, [sp, -4]!"));
    } else if cursor.consume_keyword("pop") || cursor.consume_keyword("popw") {
        let ra = register_operand(cursor)?;
        result.push_str(&format!("lwa  r{ra}, [sp], 4"));
    } else if cursor.consume_keyword("pshd") {
        let ra = register_operand(cursor)?;
        result.push_str(&format!("sda  r{ra}, [sp, -2]!"));
    } else if cursor.consume_keyword("popd") {
        let ra = register_operand(cursor)?;
        result.push_str(&format!("lda  r{ra}, [sp], 2"));
    } else if cursor.consume_keyword("pshb") {
        let ra = register_operand(cursor)?;
        result.push_str(&format!("sba  r{ra}, [sp, -1]!"));
    } else if cursor.consume_keyword("popb") {
        let ra = register_operand(cursor)?;
        result.push_str(&format!("lba  r{ra}, [sp], 1"));
    } else if cursor.consume_keyword("movi") {
        expand_movi(cursor, result)?;
    } else if cursor.consume_keyword("mov") {
        expand_mov(cursor, result)?;
    } else if cursor.consume_keyword("call") {
        expand_call(cursor, result)?;
    } else {
        return Ok(false);
    }

    Ok(true)
}

fn register_operand(cursor: &mut Cursor<'_>) -> Result<u8, Error> {
    cursor.register().ok_or_else(|| {
        cursor.syntax_error("Invalid register\nValid registers are r0 - r31")
    })
}

/// `movi ra, imm` becomes a `movu`/`movl` pair. Constants are split here;
/// labels are forwarded by name and split by the encoder, which applies the
/// pc compensation.
fn expand_movi(cursor: &mut Cursor<'_>, result: &mut String) -> Result<(), Error> {
    let ra = register_operand(cursor)?;

    if let Some(imm) = cursor.literal()? {
        let imm = imm as u32;
        result.push_str(&format!("movu r{ra}, 0x{imm:X}; movl r{ra}, 0x{imm:X}"));
    } else if let Some(label) = cursor.identifier() {
        result.push_str(&format!("movu r{ra}, {label}; movl r{ra}, {label}"));
    } else {
        return Err(cursor.syntax_error("Expected immediate"));
    }

    Ok(())
}

/// `mov` copies between registers, reaching for `crmv` when a control
/// register is involved.
fn expand_mov(cursor: &mut Cursor<'_>, result: &mut String) -> Result<(), Error> {
    if let Some(ra) = cursor.register() {
        if let Some(rb) = cursor.register() {
            result.push_str(&format!("add  r{ra}, r{rb}, r0"));
        } else if let Some(crb) = cursor.control_register() {
            result.push_str(&format!("crmv r{ra}, cr{crb}"));
        } else {
            return Err(cursor.syntax_error("Invalid register\nValid registers are r0 - r31"));
        }
    } else if let Some(cra) = cursor.control_register() {
        if let Some(rb) = cursor.register() {
            result.push_str(&format!("crmv cr{cra}, r{rb}"));
        } else if let Some(crb) = cursor.control_register() {
            result.push_str(&format!("crmv cr{cra}, cr{crb}"));
        } else {
            return Err(cursor.syntax_error("Invalid register\nValid registers are r0 - r31"));
        }
    } else {
        return Err(cursor.syntax_error("Invalid register\nValid registers are r0 - r31"));
    }

    Ok(())
}

/// `call target` materialises the target into `ra` and branches through it.
fn expand_call(cursor: &mut Cursor<'_>, result: &mut String) -> Result<(), Error> {
    if let Some(imm) = cursor.literal()? {
        let imm = imm as u32;
        result.push_str(&format!(
            "movu r29, 0x{imm:X}; movl r29, 0x{imm:X}; br r29, r29"
        ));
    } else if let Some(label) = cursor.identifier() {
        result.push_str(&format!("movu r29, {label}; movl r29, {label}; br r29, r29"));
    } else {
        return Err(cursor.syntax_error("Expected immediate"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{Mode, Source};

    fn preprocess_one(text: &str) -> String {
        let configuration =
            Configuration::new(vec![Source::new("test.s", text)], Mode::User);

        preprocess(&configuration).unwrap().remove(0)
    }

    #[test]
    fn test_comments_are_stripped() {
        assert_eq!(preprocess_one("add r1, r2, r3 # tail\n# whole line\n"), "add r1, r2, r3 \n\n");
    }

    #[test]
    fn test_macro_free_text_is_unchanged() {
        let text = "add r1, r2, r3\n  sub r4, r5, 1\nloop: br loop\n";
        assert_eq!(preprocess_one(text), text);
    }

    #[test]
    fn test_nop_and_ret() {
        assert_eq!(preprocess_one("nop\n"), "and  r0, r0, r0\n");
        assert_eq!(preprocess_one("ret\n"), "jmp  r29\n");
    }

    #[test]
    fn test_stack_macros() {
        assert_eq!(preprocess_one("push r5\n"), "swa  r5, [sp, -4]!\n");
        assert_eq!(preprocess_one("pop r5\n"), "lwa  r5, [sp], 4\n");
        assert_eq!(preprocess_one("pshd r6\n"), "sda  r6, [sp, -2]!\n");
        assert_eq!(preprocess_one("popd r6\n"), "lda  r6, [sp], 2\n");
        assert_eq!(preprocess_one("pshb r7\n"), "sba  r7, [sp, -1]!\n");
        assert_eq!(preprocess_one("popb r7\n"), "lba  r7, [sp], 1\n");
        // Aliases for the word forms.
        assert_eq!(preprocess_one("pshw sp\n"), "swa  r31, [sp, -4]!\n");
        assert_eq!(preprocess_one("popw ra\n"), "lwa  r29, [sp], 4\n");
    }

    #[test]
    fn test_movi_constant_splits_here() {
        assert_eq!(
            preprocess_one("movi r1, 0x12345678\n"),
            "movu r1, 0x12345678; movl r1, 0x12345678\n",
        );
    }

    #[test]
    fn test_movi_label_is_forwarded() {
        assert_eq!(
            preprocess_one("movi r1, table\n"),
            "movu r1, table; movl r1, table\n",
        );
    }

    #[test]
    fn test_mov_variants() {
        assert_eq!(preprocess_one("mov r1, r2\n"), "add  r1, r2, r0\n");
        assert_eq!(preprocess_one("mov r1, psr\n"), "crmv r1, cr0\n");
        assert_eq!(preprocess_one("mov epc, r3\n"), "crmv cr4, r3\n");
        assert_eq!(preprocess_one("mov cr1, cr2\n"), "crmv cr1, cr2\n");
    }

    #[test]
    fn test_call_emits_three_instructions() {
        assert_eq!(
            preprocess_one("call handler\n"),
            "movu r29, handler; movl r29, handler; br r29, r29\n",
        );
        assert_eq!(
            preprocess_one("call 0x80000400\n"),
            "movu r29, 0x80000400; movl r29, 0x80000400; br r29, r29\n",
        );
    }

    #[test]
    fn test_identifiers_embedding_macro_names_survive() {
        assert_eq!(preprocess_one("snop: add r1, r2, r3\n"), "snop: add r1, r2, r3\n");
        assert_eq!(preprocess_one("popcount: ret\n"), "popcount: jmp  r29\n");
    }

    #[test]
    fn test_entry_thunk_is_prepended_to_the_first_file() {
        let configuration = Configuration::new(
            vec![Source::new("a.s", "nop\n"), Source::new("b.s", "nop\n")],
            Mode::Kernel,
        )
        .with_entry_thunk(true);

        let results = preprocess(&configuration).unwrap();
        assert!(results[0].starts_with("  movu r29, _start; movl r29, _start; br r29, r29\n"));
        assert!(!results[1].contains("_start"));
    }

    #[test]
    fn test_macro_register_errors_are_reported() {
        let configuration =
            Configuration::new(vec![Source::new("test.s", "push r99\n")], Mode::User);

        assert!(preprocess(&configuration).is_err());
    }
}
