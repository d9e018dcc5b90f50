//! The instruction consumer shared by both passes.
//!
//! Pass 1 runs it for syntax checking and byte counting (names defer to a
//! sentinel value); pass 2 runs it for real, resolving operands against the
//! symbol tables at the instruction's final program counter and producing
//! the encoded word.

use crate::diagnostics::{Error, Scan};
use crate::encoder::{
    self, AddressingMode, AtomicOp, CrmvKind, EncodeError, MemoryForm, MemoryWidth, MovHalf,
};
use crate::configuration::Mode;
use crate::passes::{Assembly, Pass};
use crate::scanner::Cursor;
use crate::symbols::Resolved;

impl<'a> Assembly<'a> {
    /// Consume a single instruction; `Ok(None)` when the cursor does not
    /// sit on a known mnemonic.
    pub(crate) fn instruction(&mut self, cursor: &mut Cursor<'a>) -> Scan<u32> {
        cursor.skip();

        let word = if cursor.consume_keyword("and") {
            self.alu(cursor, 0)?
        } else if cursor.consume_keyword("nand") {
            self.alu(cursor, 1)?
        } else if cursor.consume_keyword("or") {
            self.alu(cursor, 2)?
        } else if cursor.consume_keyword("nor") {
            self.alu(cursor, 3)?
        } else if cursor.consume_keyword("xor") {
            self.alu(cursor, 4)?
        } else if cursor.consume_keyword("xnor") {
            self.alu(cursor, 5)?
        } else if cursor.consume_keyword("not") {
            self.alu(cursor, 6)?
        } else if cursor.consume_keyword("lsl") {
            self.alu(cursor, 7)?
        } else if cursor.consume_keyword("lsr") {
            self.alu(cursor, 8)?
        } else if cursor.consume_keyword("asr") {
            self.alu(cursor, 9)?
        } else if cursor.consume_keyword("rotl") {
            self.alu(cursor, 10)?
        } else if cursor.consume_keyword("rotr") {
            self.alu(cursor, 11)?
        } else if cursor.consume_keyword("lslc") {
            self.alu(cursor, 12)?
        } else if cursor.consume_keyword("lsrc") {
            self.alu(cursor, 13)?
        } else if cursor.consume_keyword("add") {
            self.alu(cursor, 14)?
        } else if cursor.consume_keyword("addc") {
            self.alu(cursor, 15)?
        } else if cursor.consume_keyword("sub") {
            self.alu(cursor, 16)?
        } else if cursor.consume_keyword("subb") {
            self.alu(cursor, 17)?
        } else if cursor.consume_keyword("sxtb") {
            self.alu(cursor, 18)?
        } else if cursor.consume_keyword("sxtd") {
            self.alu(cursor, 19)?
        } else if cursor.consume_keyword("tncb") {
            self.alu(cursor, 20)?
        } else if cursor.consume_keyword("tncd") {
            self.alu(cursor, 21)?
        } else if cursor.consume_keyword("cmp") {
            self.cmp(cursor)?
        } else if cursor.consume_keyword("lui") {
            self.lui(cursor)?
        } else if cursor.consume_keyword("swa") {
            self.memory(cursor, MemoryWidth::Word, true, false)?
        } else if cursor.consume_keyword("lwa") {
            self.memory(cursor, MemoryWidth::Word, true, true)?
        } else if cursor.consume_keyword("sw") {
            self.memory(cursor, MemoryWidth::Word, false, false)?
        } else if cursor.consume_keyword("lw") {
            self.memory(cursor, MemoryWidth::Word, false, true)?
        } else if cursor.consume_keyword("sda") {
            self.memory(cursor, MemoryWidth::Half, true, false)?
        } else if cursor.consume_keyword("lda") {
            self.memory(cursor, MemoryWidth::Half, true, true)?
        } else if cursor.consume_keyword("sd") {
            self.memory(cursor, MemoryWidth::Half, false, false)?
        } else if cursor.consume_keyword("ld") {
            self.memory(cursor, MemoryWidth::Half, false, true)?
        } else if cursor.consume_keyword("sba") {
            self.memory(cursor, MemoryWidth::Byte, true, false)?
        } else if cursor.consume_keyword("lba") {
            self.memory(cursor, MemoryWidth::Byte, true, true)?
        } else if cursor.consume_keyword("sb") {
            self.memory(cursor, MemoryWidth::Byte, false, false)?
        } else if cursor.consume_keyword("lb") {
            self.memory(cursor, MemoryWidth::Byte, false, true)?
        } else if cursor.consume_keyword("fada") {
            self.atomic(cursor, AtomicOp::FetchAdd, true)?
        } else if cursor.consume_keyword("fad") {
            self.atomic(cursor, AtomicOp::FetchAdd, false)?
        } else if cursor.consume_keyword("swpa") {
            self.atomic(cursor, AtomicOp::Swap, true)?
        } else if cursor.consume_keyword("swp") {
            self.atomic(cursor, AtomicOp::Swap, false)?
        } else if cursor.consume_keyword("br") {
            self.branch(cursor, 0, false)?
        } else if cursor.consume_keyword("bz") {
            self.branch(cursor, 1, false)?
        } else if cursor.consume_keyword("bnz") {
            self.branch(cursor, 2, false)?
        } else if cursor.consume_keyword("bs") {
            self.branch(cursor, 3, false)?
        } else if cursor.consume_keyword("bns") {
            self.branch(cursor, 4, false)?
        } else if cursor.consume_keyword("bc") {
            self.branch(cursor, 5, false)?
        } else if cursor.consume_keyword("bnc") {
            self.branch(cursor, 6, false)?
        } else if cursor.consume_keyword("bo") {
            self.branch(cursor, 7, false)?
        } else if cursor.consume_keyword("bno") {
            self.branch(cursor, 8, false)?
        } else if cursor.consume_keyword("bps") {
            self.branch(cursor, 9, false)?
        } else if cursor.consume_keyword("bnps") {
            self.branch(cursor, 10, false)?
        } else if cursor.consume_keyword("bg") {
            self.branch(cursor, 11, false)?
        } else if cursor.consume_keyword("bge") {
            self.branch(cursor, 12, false)?
        } else if cursor.consume_keyword("bl") {
            self.branch(cursor, 13, false)?
        } else if cursor.consume_keyword("ble") {
            self.branch(cursor, 14, false)?
        } else if cursor.consume_keyword("ba") {
            self.branch(cursor, 15, false)?
        } else if cursor.consume_keyword("bae") {
            self.branch(cursor, 16, false)?
        } else if cursor.consume_keyword("bb") {
            self.branch(cursor, 17, false)?
        } else if cursor.consume_keyword("bbe") {
            self.branch(cursor, 18, false)?
        } else if cursor.consume_keyword("bra") {
            self.branch(cursor, 0, true)?
        } else if cursor.consume_keyword("bza") {
            self.branch(cursor, 1, true)?
        } else if cursor.consume_keyword("bnza") {
            self.branch(cursor, 2, true)?
        } else if cursor.consume_keyword("bsa") {
            self.branch(cursor, 3, true)?
        } else if cursor.consume_keyword("bnsa") {
            self.branch(cursor, 4, true)?
        } else if cursor.consume_keyword("bca") {
            self.branch(cursor, 5, true)?
        } else if cursor.consume_keyword("bnca") {
            self.branch(cursor, 6, true)?
        } else if cursor.consume_keyword("boa") {
            self.branch(cursor, 7, true)?
        } else if cursor.consume_keyword("bnoa") {
            self.branch(cursor, 8, true)?
        } else if cursor.consume_keyword("bpa") {
            self.branch(cursor, 9, true)?
        } else if cursor.consume_keyword("bnpa") {
            self.branch(cursor, 10, true)?
        } else if cursor.consume_keyword("bga") {
            self.branch(cursor, 11, true)?
        } else if cursor.consume_keyword("bgea") {
            self.branch(cursor, 12, true)?
        } else if cursor.consume_keyword("bla") {
            self.branch(cursor, 13, true)?
        } else if cursor.consume_keyword("blea") {
            self.branch(cursor, 14, true)?
        } else if cursor.consume_keyword("baa") {
            self.branch(cursor, 15, true)?
        } else if cursor.consume_keyword("baea") {
            self.branch(cursor, 16, true)?
        } else if cursor.consume_keyword("bba") {
            self.branch(cursor, 17, true)?
        } else if cursor.consume_keyword("bbea") {
            self.branch(cursor, 18, true)?
        } else if cursor.consume_keyword("jmp") {
            self.jmp(cursor)?
        } else if cursor.consume_keyword("adpc") {
            self.adpc(cursor)?
        } else if cursor.consume_keyword("tlbr") {
            self.tlb(cursor, 0)?
        } else if cursor.consume_keyword("tlbw") {
            self.tlb(cursor, 1)?
        } else if cursor.consume_keyword("tlbc") {
            self.tlb(cursor, 2)?
        } else if cursor.consume_keyword("crmv") {
            self.crmv(cursor)?
        } else if cursor.consume_keyword("mode") {
            self.mode_instruction(cursor)?
        } else if cursor.consume_keyword("rfe") || cursor.consume_keyword("rfi") {
            self.rfe(cursor)?
        } else if cursor.consume_keyword("ipi") {
            self.ipi(cursor)?
        } else if cursor.consume_keyword("movu") {
            self.mov_half(cursor, MovHalf::Upper)?
        } else if cursor.consume_keyword("movl") {
            self.mov_half(cursor, MovHalf::Lower)?
        } else {
            return Ok(None);
        };

        Ok(Some(word))
    }

    fn require_register(&self, cursor: &mut Cursor<'a>) -> Result<u8, Error> {
        cursor
            .register()
            .ok_or_else(|| cursor.syntax_error("Invalid register\nValid registers are r0 - r31"))
    }

    fn encode(
        &self,
        cursor: &Cursor<'a>,
        result: Result<u32, EncodeError>,
    ) -> Result<u32, Error> {
        result.map_err(|error| Error::Encoding(cursor.context(), error.to_string()))
    }

    /// A literal or a name. Constants resolve to their raw value; labels
    /// resolve pc-relatively (`value - pc - 4`). Pass 1 defers names to 0.
    fn immediate(&mut self, cursor: &mut Cursor<'a>) -> Scan<i64> {
        if let Some(name) = cursor.identifier() {
            if self.pass == Pass::Layout {
                return Ok(Some(0));
            }

            let pc = self.pc() as i64;
            return match self.symbols.resolve(self.file_index, name) {
                Some(Resolved::Define(value)) => Ok(Some(value)),
                Some(Resolved::Label(value)) => Ok(Some(value as i64 - pc - 4)),
                None => Err(Error::Symbol(
                    cursor.context(),
                    format!("Label \"{name}\" has not been defined"),
                )),
            };
        }

        cursor.literal()
    }

    fn alu(&mut self, cursor: &mut Cursor<'a>, op: u8) -> Result<u32, Error> {
        let ra = self.require_register(cursor)?;

        // `not`, the sign extensions, and the truncations take two
        // operands; rb is implicitly 0.
        let rb = if op == 6 || (18..=21).contains(&op) {
            0
        } else {
            self.require_register(cursor)?
        };

        if let Some(rc) = cursor.register() {
            Ok(encoder::alu_register(op, ra, rb, rc))
        } else {
            let imm = self
                .immediate(cursor)?
                .ok_or_else(|| cursor.syntax_error("Invalid register or immediate"))?;
            self.encode(cursor, encoder::alu_immediate(op, ra, rb, imm))
        }
    }

    /// `cmp` is `sub` with the destination fixed to r0.
    fn cmp(&mut self, cursor: &mut Cursor<'a>) -> Result<u32, Error> {
        let rb = self.require_register(cursor)?;

        if let Some(rc) = cursor.register() {
            Ok(encoder::alu_register(16, 0, rb, rc))
        } else {
            let imm = self
                .immediate(cursor)?
                .ok_or_else(|| cursor.syntax_error("Invalid register or immediate"))?;
            self.encode(cursor, encoder::alu_immediate(16, 0, rb, imm))
        }
    }

    fn lui(&mut self, cursor: &mut Cursor<'a>) -> Result<u32, Error> {
        let ra = self.require_register(cursor)?;
        let imm = self
            .immediate(cursor)?
            .ok_or_else(|| cursor.syntax_error("Invalid immediate"))?;

        self.encode(cursor, encoder::lui(ra, imm))
    }

    /// Parse a memory operand: `[rb]`, `[rb, imm]`, `[rb, imm]!`,
    /// `[rb], imm`, or `[imm]`.
    fn memory_operand(
        &mut self,
        cursor: &mut Cursor<'a>,
        is_absolute: bool,
    ) -> Result<(MemoryForm, i64), Error> {
        if !cursor.consume("[") {
            return Err(cursor.syntax_error("Expected \"[\" in memory instruction"));
        }

        let rb = cursor.register();
        if is_absolute && rb.is_none() {
            return Err(cursor.syntax_error("Invalid register\nValid registers are r0 - r31"));
        }

        if cursor.consume("]") {
            if let Some(imm) = cursor.literal()? {
                // `[rb], imm` is a post-increment.
                if !is_absolute {
                    return Err(cursor.syntax_error(
                        "Postincrement addressing not allowed for relative addressing",
                    ));
                }
                let rb = rb.expect("absolute forms always carry a base register");
                return Ok((MemoryForm::Absolute { rb, mode: AddressingMode::PostIncrement }, imm));
            }

            return Ok(match rb {
                Some(rb) if is_absolute => {
                    (MemoryForm::Absolute { rb, mode: AddressingMode::Offset }, 0)
                }
                Some(rb) => (MemoryForm::Relative { rb }, 0),
                None => (MemoryForm::LongRelative, 0),
            });
        }

        let imm = self
            .immediate(cursor)?
            .ok_or_else(|| cursor.syntax_error("Invalid immediate in memory instruction"))?;

        if !cursor.consume("]") {
            return Err(cursor.syntax_error("Expected \"]\" in memory instruction"));
        }

        if cursor.consume("!") {
            if !is_absolute {
                return Err(cursor.syntax_error(
                    "Preincrement addressing not allowed for relative addressing",
                ));
            }
            let rb = rb.expect("absolute forms always carry a base register");
            return Ok((MemoryForm::Absolute { rb, mode: AddressingMode::PreIncrement }, imm));
        }

        Ok(match rb {
            Some(rb) if is_absolute => (MemoryForm::Absolute { rb, mode: AddressingMode::Offset }, imm),
            Some(rb) => (MemoryForm::Relative { rb }, imm),
            None => (MemoryForm::LongRelative, imm),
        })
    }

    fn memory(
        &mut self,
        cursor: &mut Cursor<'a>,
        width: MemoryWidth,
        is_absolute: bool,
        is_load: bool,
    ) -> Result<u32, Error> {
        let ra = self.require_register(cursor)?;
        let (form, imm) = self.memory_operand(cursor, is_absolute)?;

        self.encode(cursor, encoder::memory(width, form, is_load, ra, imm))
    }

    fn atomic(
        &mut self,
        cursor: &mut Cursor<'a>,
        op: AtomicOp,
        is_absolute: bool,
    ) -> Result<u32, Error> {
        let ra = self.require_register(cursor)?;
        let (form, imm) = self.memory_operand(cursor, is_absolute)?;

        self.encode(cursor, encoder::atomic(op, form, ra, imm))
    }

    fn branch(
        &mut self,
        cursor: &mut Cursor<'a>,
        condition: u8,
        is_absolute: bool,
    ) -> Result<u32, Error> {
        if let Some(ra) = cursor.register() {
            // With a single register `ra` is omitted: the target is in rb.
            let (ra, rb) = match cursor.register() {
                Some(rb) => (ra, rb),
                None => (0, ra),
            };
            return Ok(encoder::branch_register(condition, is_absolute, ra, rb));
        }

        let imm = self.immediate(cursor)?.ok_or_else(|| {
            cursor.syntax_error("Branch instruction expects register or immediate operand")
        })?;

        if is_absolute {
            return Err(cursor.syntax_error("Immediate branch is not allowed for absolute branches"));
        }

        self.encode(cursor, encoder::branch_immediate(condition, imm))
    }

    /// `jmp` is the unconditional alias: immediate targets are pc-relative,
    /// register targets are absolute.
    fn jmp(&mut self, cursor: &mut Cursor<'a>) -> Result<u32, Error> {
        if let Some(ra) = cursor.register() {
            return Ok(encoder::jmp_register(ra));
        }

        let imm = self.immediate(cursor)?.ok_or_else(|| {
            cursor.syntax_error("Branch instruction expects register or immediate operand")
        })?;

        self.encode(cursor, encoder::branch_immediate(0, imm))
    }

    fn adpc(&mut self, cursor: &mut Cursor<'a>) -> Result<u32, Error> {
        let ra = self.require_register(cursor)?;
        let imm = self
            .immediate(cursor)?
            .ok_or_else(|| cursor.syntax_error("Invalid immediate"))?;

        self.encode(cursor, encoder::adpc(ra, imm))
    }

    fn check_privileges(&self, cursor: &Cursor<'a>) -> Result<(), Error> {
        if self.mode != Mode::Kernel {
            return Err(Error::Encoding(
                cursor.context(),
                "Used privileged instruction\nPass --kernel if this was intentional".to_string(),
            ));
        }

        Ok(())
    }

    fn tlb(&mut self, cursor: &mut Cursor<'a>, op: u8) -> Result<u32, Error> {
        self.check_privileges(cursor)?;

        if op == 2 {
            return Ok(encoder::tlb(op, 0, 0));
        }

        let ra = self.require_register(cursor)?;
        let rb = self.require_register(cursor)?;

        Ok(encoder::tlb(op, ra, rb))
    }

    fn crmv(&mut self, cursor: &mut Cursor<'a>) -> Result<u32, Error> {
        self.check_privileges(cursor)?;

        if let Some(ra) = cursor.register() {
            let crb = cursor
                .control_register()
                .ok_or_else(|| cursor.syntax_error("Invalid control register"))?;
            return Ok(encoder::crmv(CrmvKind::FromControl, ra, crb));
        }

        let Some(cra) = cursor.control_register() else {
            return Err(cursor.syntax_error("Invalid register or control register"));
        };

        if let Some(crb) = cursor.control_register() {
            Ok(encoder::crmv(CrmvKind::BetweenControl, cra, crb))
        } else if let Some(rb) = cursor.register() {
            Ok(encoder::crmv(CrmvKind::IntoControl, cra, rb))
        } else {
            Err(cursor.syntax_error("Invalid control register"))
        }
    }

    fn mode_instruction(&mut self, cursor: &mut Cursor<'a>) -> Result<u32, Error> {
        self.check_privileges(cursor)?;

        cursor.skip();
        let mode = if cursor.consume_keyword("run") {
            0
        } else if cursor.consume_keyword("sleep") {
            1
        } else if cursor.consume_keyword("halt") {
            2
        } else {
            return Err(cursor.syntax_error("Invalid mode\nValid modes are: run, sleep, or halt"));
        };

        Ok(encoder::mode_op(mode))
    }

    fn rfe(&mut self, cursor: &mut Cursor<'a>) -> Result<u32, Error> {
        self.check_privileges(cursor)?;

        let ra = self.require_register(cursor)?;
        let rb = self.require_register(cursor)?;

        Ok(encoder::rfe(ra, rb))
    }

    fn ipi(&mut self, cursor: &mut Cursor<'a>) -> Result<u32, Error> {
        self.check_privileges(cursor)?;

        let ra = self.require_register(cursor)?;
        let rb = self.require_register(cursor)?;

        Ok(encoder::ipi(ra, rb))
    }

    /// The operand of `movu`/`movl`: a constant (raw) or a label
    /// (pc-relative, compensated by the encoder).
    fn mov_operand(&mut self, cursor: &mut Cursor<'a>) -> Result<(i64, bool), Error> {
        if let Some(name) = cursor.identifier() {
            if self.pass == Pass::Layout {
                return Ok((0, true));
            }

            let pc = self.pc() as i64;
            return match self.symbols.resolve(self.file_index, name) {
                Some(Resolved::Define(value)) => Ok((value, false)),
                Some(Resolved::Label(value)) => Ok((value as i64 - pc - 4, true)),
                None => Err(Error::Symbol(
                    cursor.context(),
                    format!("Label \"{name}\" has not been defined"),
                )),
            };
        }

        match cursor.literal()? {
            Some(value) => Ok((value, false)),
            None => Err(cursor.syntax_error("movi expects label or integer literal")),
        }
    }

    fn mov_half(&mut self, cursor: &mut Cursor<'a>, half: MovHalf) -> Result<u32, Error> {
        let ra = self.require_register(cursor)?;
        let (value, is_label) = self.mov_operand(cursor)?;

        self.encode(cursor, encoder::mov_half(half, is_label, ra, value))
    }
}
