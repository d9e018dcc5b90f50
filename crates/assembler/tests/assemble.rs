//! End-to-end assembly tests: whole programs in, images out.

use dasm_assembler::{Configuration, Error, Mode, Program, Source};

fn assemble(sources: Vec<Source>, mode: Mode) -> Result<Program, Error> {
    Configuration::new(sources, mode).assembler().assemble()
}

fn assemble_one(text: &str, mode: Mode) -> Result<Program, Error> {
    assemble(vec![Source::new("test.s", text)], mode)
}

fn image_text(program: &Program) -> String {
    let mut out = Vec::new();
    program.write_image(&mut out).unwrap();

    String::from_utf8(out).unwrap()
}

/// Decode the hex-word rendering of a user image back into raw bytes,
/// stopping at the debug trailer.
fn image_bytes(program: &Program) -> Vec<u8> {
    image_text(program)
        .lines()
        .take_while(|line| !line.starts_with('#'))
        .flat_map(|line| u32::from_str_radix(line, 16).unwrap().to_le_bytes())
        .collect()
}

#[test]
fn minimal_kernel_program() {
    let program = assemble_one("add r1, r2, r3\n", Mode::Kernel).unwrap();

    assert_eq!(image_text(&program), "@0\n004401C3\n");
}

#[test]
fn kernel_origin_opens_a_new_chunk() {
    let program = assemble_one(
        "add r1, r2, r3\n\
         .origin 0x400\n\
         add r1, r2, r3\n",
        Mode::Kernel,
    )
    .unwrap();

    assert_eq!(image_text(&program), "@0\n004401C3\n@100\n004401C3\n");
}

#[test]
fn kernel_origin_cannot_go_backwards() {
    let error = assemble_one(
        ".origin 0x400\n\
         add r1, r2, r3\n\
         .origin 0x100\n",
        Mode::Kernel,
    )
    .unwrap_err();

    assert!(error.to_string().contains(".origin cannot be used to go backwards"));
}

#[test]
fn pc_relative_branch_backwards() {
    let program = assemble_one(
        "start:  nop\n\
         \x20       br start\n",
        Mode::Kernel,
    )
    .unwrap();

    let words = program.sections[0].words();
    // nop expands to `and r0, r0, r0`, the all-zero word.
    assert_eq!(words[0], 0);
    // The branch sits at pc 4 and targets 0: displacement -8, stored >> 2.
    assert_eq!(words[1] >> 27, 12);
    assert_eq!(words[1] & 0x3F_FFFF, 0x3F_FFFE);
}

#[test]
fn branch_forward_to_global_in_a_later_file() {
    let program = assemble(
        vec![
            Source::new(
                "a.s",
                ".text\n\
                 .global _start\n\
                 _start:\n\
                 .global main\n\
                 \x20 br main\n",
            ),
            Source::new(
                "b.s",
                ".text\n\
                 main:\n\
                 \x20 ret\n",
            ),
        ],
        Mode::User,
    )
    .unwrap();

    assert_eq!(program.entry_point, 0x8000_0000);

    let text = &program.sections[0];
    // main sits right after a.s's single instruction: displacement
    // 0x80000004 - 0x80000000 - 4 = 0.
    assert_eq!(text.words()[0], 12 << 27);
    // ret is `jmp r29`.
    assert_eq!(text.words()[1], (13 << 27) | 29);
}

#[test]
fn global_defined_in_an_earlier_file_is_visible_later() {
    let program = assemble(
        vec![
            Source::new(
                "a.s",
                ".text\n\
                 .global _start\n\
                 _start:\n\
                 \x20 ret\n",
            ),
            Source::new(
                "b.s",
                ".text\n\
                 \x20 br _start\n",
            ),
        ],
        Mode::User,
    )
    .unwrap();

    let text = &program.sections[0];
    // b.s's branch sits at 0x80000004: displacement -8.
    assert_eq!(text.words()[1] & 0x3F_FFFF, 0x3F_FFFE);
}

#[test]
fn elf_header_of_a_user_image() {
    let program = assemble_one(
        ".text\n\
         .global _start\n\
         _start:\n\
         \x20 ret\n",
        Mode::User,
    )
    .unwrap();

    let bytes = image_bytes(&program);

    assert_eq!(
        &bytes[..16],
        &[0x7F, b'E', b'L', b'F', 0x01, 0x01, 0x01, 0x00, 0, 0, 0, 0, 0, 0, 0, 0],
    );
    // e_type = executable, e_machine = 0xD105.
    assert_eq!(&bytes[16..20], &[0x02, 0x00, 0x05, 0xD1]);
    // e_entry = _start.
    assert_eq!(&bytes[24..28], &0x8000_0000u32.to_le_bytes());
    // 52-byte header, three 32-byte program headers, then the text payload.
    assert_eq!(&bytes[148..152], &((13u32 << 27) | 29).to_le_bytes());
}

#[test]
fn section_layout_and_relocation() {
    let program = Configuration::new(
        vec![Source::new(
            "test.s",
            ".text\n\
             .global _start\n\
             _start:\n\
             \x20 ret\n\
             \x20 ret\n\
             .rodata\n\
             table:\n\
             .fill 0x11223344\n\
             .data\n\
             byte:\n\
             .filb 0xAB\n\
             .bss\n\
             scratch:\n\
             .space 8\n",
        )],
        Mode::User,
    )
    .with_debug(true)
    .assembler()
    .assemble()
    .unwrap();

    // Text is 8 bytes; rodata starts on the next page, data on the one
    // after; bss follows data without page alignment.
    let labels = &program.debug.as_ref().unwrap().labels;
    let find = |name: &str| labels.iter().find(|label| label.name == name).unwrap();

    assert_eq!(find("_start").addr, 0x8000_0000);
    assert!(!find("_start").is_data);
    assert_eq!(find("table").addr, 0x8000_1000);
    assert!(find("table").is_data);
    assert_eq!(find("byte").addr, 0x8000_2000);
    assert_eq!(find("scratch").addr, 0x8000_2004);

    assert_eq!(program.bss_size, 8);

    // The rodata payload follows the 8 text bytes.
    let bytes = image_bytes(&program);
    assert_eq!(&bytes[156..160], &[0x44, 0x33, 0x22, 0x11]);
    // The data byte is packed into a zero-padded word.
    assert_eq!(&bytes[160..164], &[0xAB, 0x00, 0x00, 0x00]);
}

#[test]
fn data_segment_memory_size_spans_the_bss() {
    let program = assemble_one(
        ".text\n\
         .global _start\n\
         _start:\n\
         \x20 ret\n\
         .data\n\
         .fill 1\n\
         .bss\n\
         .space 12\n",
        Mode::User,
    )
    .unwrap();

    let bytes = image_bytes(&program);
    // Third program header: p_filesz = 4, p_memsz = 16.
    let ph = &bytes[116..148];
    assert_eq!(&ph[16..20], &4u32.to_le_bytes());
    assert_eq!(&ph[20..24], &16u32.to_le_bytes());
}

#[test]
fn duplicate_global_definitions_fail() {
    let error = assemble(
        vec![
            Source::new("a.s", ".text\n.global _start\n_start:\n.global foo\nfoo:\n ret\n"),
            Source::new("b.s", ".text\n.global foo\nfoo:\n ret\n"),
        ],
        Mode::User,
    )
    .unwrap_err();

    assert!(error.to_string().contains("Duplicate global label"));
}

#[test]
fn duplicate_label_in_one_file_fails() {
    let error = assemble_one("loop:\n nop\nloop:\n nop\n", Mode::Kernel).unwrap_err();

    assert!(error.to_string().contains("Duplicate label"));
}

#[test]
fn undefined_label_fails_in_pass_two() {
    let error = assemble_one(" br nowhere\n", Mode::Kernel).unwrap_err();

    assert!(error.to_string().contains("\"nowhere\" has not been defined"));
}

#[test]
fn missing_start_fails_in_user_mode() {
    let error = assemble_one(".text\n ret\n", Mode::User).unwrap_err();

    assert!(matches!(error, Error::MissingStart));
}

#[test]
fn privileged_instruction_needs_kernel_mode() {
    let error = assemble_one(
        ".text\n.global _start\n_start:\n tlbc\n",
        Mode::User,
    )
    .unwrap_err();

    assert!(error.to_string().contains("privileged instruction"));

    assert!(assemble_one("_start:\n tlbc\n", Mode::Kernel).is_ok());
}

#[test]
fn instructions_are_forbidden_in_bss() {
    let error = assemble_one(
        ".text\n.global _start\n_start:\n.bss\n nop\n",
        Mode::User,
    )
    .unwrap_err();

    assert!(error.to_string().contains("forbidden in .bss"));
}

#[test]
fn section_directives_require_user_mode() {
    let error = assemble_one(".text\n nop\n", Mode::Kernel).unwrap_err();

    assert!(error.to_string().contains("only available in user mode"));
}

#[test]
fn origin_requires_kernel_mode() {
    let error = assemble_one(".origin 0x100\n", Mode::User).unwrap_err();

    assert!(error.to_string().contains(".origin is only available in kernel mode"));
}

#[test]
fn misaligned_instruction_fails() {
    let error = assemble_one(
        ".text\n.global _start\n_start:\n.filb 1\n nop\n",
        Mode::User,
    )
    .unwrap_err();

    assert!(matches!(error, Error::Alignment(_, 1)));
}

#[test]
fn align_directive_restores_alignment() {
    let program = assemble_one(
        ".text\n.global _start\n_start:\n.filb 1\n.align 4\n nop\n",
        Mode::User,
    )
    .unwrap();

    let words = program.sections[0].words();
    assert_eq!(words.len(), 2);
    assert_eq!(words[0], 1);
    assert_eq!(words[1], 0);
}

#[test]
fn movi_and_call_expand_and_relocate() {
    let program = assemble_one(
        "_start:\n\
         \x20 movi r1, 0x12345678\n\
         \x20 call helper\n\
         helper:\n\
         \x20 ret\n",
        Mode::Kernel,
    )
    .unwrap();

    let words = program.sections[0].words();
    assert_eq!(words.len(), 6);

    // movi splits the constant into lui + add halves.
    assert_eq!(words[0], (2 << 27) | (1 << 22) | (0x1234_5678 >> 10));
    assert_eq!(words[1], (1 << 27) | (1 << 22) | (1 << 17) | (14 << 12) | 0x278);

    // call materialises `helper` pc-relatively into ra. helper sits at 20;
    // the movu at pc 8 sees displacement 8 and compensates by -8, the movl
    // at pc 12 sees 4 and compensates by -4.
    assert_eq!(words[2], (2 << 27) | (29 << 22));
    assert_eq!(words[3], (1 << 27) | (29 << 22) | (29 << 17) | (14 << 12));
    assert_eq!(words[4], (14 << 27) | (29 << 5) | 29);

    // ret.
    assert_eq!(words[5], (13 << 27) | 29);
}

#[test]
fn movi_with_a_define_is_not_pc_adjusted() {
    let program = assemble_one(
        ".define OFFSET 0x400\n\
         _start:\n\
         \x20 movi r1, OFFSET\n",
        Mode::Kernel,
    )
    .unwrap();

    let words = program.sections[0].words();
    assert_eq!(words[0], (2 << 27) | (1 << 22) | 1);
    assert_eq!(words[1], (1 << 27) | (1 << 22) | (1 << 17) | (14 << 12));
}

#[test]
fn defines_feed_directives_and_operands() {
    let program = assemble_one(
        ".define SLOT 4\n\
         .define COUNT 8\n\
         _start:\n\
         \x20 add r1, r0, SLOT\n\
         .space COUNT\n",
        Mode::Kernel,
    )
    .unwrap();

    let words = program.sections[0].words();
    assert_eq!(words[0] & 0xFFF, 4);
    // 8 zero bytes follow the instruction.
    assert_eq!(words.len(), 3);
}

#[test]
fn command_line_defines_reach_every_file() {
    let program = Configuration::new(
        vec![
            Source::new("a.s", "_start:\n add r1, r0, LIMIT\n"),
            Source::new("b.s", " add r2, r0, LIMIT\n"),
        ],
        Mode::Kernel,
    )
    .with_defines(vec![("LIMIT".to_string(), "0x7F".to_string())])
    .assembler()
    .assemble()
    .unwrap();

    let words = program.sections[0].words();
    assert_eq!(words[0] & 0xFFF, 0x7F);
    assert_eq!(words[1] & 0xFFF, 0x7F);
}

#[test]
fn redefined_constant_fails() {
    let error = assemble_one(
        ".define X 1\n.define X 2\n_start:\n nop\n",
        Mode::Kernel,
    )
    .unwrap_err();

    assert!(error.to_string().contains("multiple definitions"));
}

#[test]
fn fill_rejects_labels_in_the_half_and_byte_forms() {
    let error = assemble_one(
        ".text\n.global _start\n_start:\n ret\n.data\n.fild _start\n",
        Mode::User,
    )
    .unwrap_err();

    assert!(error.to_string().contains("only permitted with .fill"));
}

#[test]
fn fill_accepts_a_label_and_stores_its_address() {
    let program = assemble_one(
        ".text\n.global _start\n_start:\n ret\n.data\n.fill _start\n",
        Mode::User,
    )
    .unwrap();

    // sections: text, rodata, data.
    assert_eq!(program.sections[2].words(), &[0x8000_0000]);
}

#[test]
fn debug_trailer_records_labels_lines_and_locals() {
    let program = Configuration::new(
        vec![Source::new(
            "test.s",
            "_start:\n\
             .line main.c 7\n\
             \x20 nop\n\
             .local count -8 4\n\
             \x20 nop\n",
        )],
        Mode::Kernel,
    )
    .with_debug(true)
    .assembler()
    .assemble()
    .unwrap();

    let text = image_text(&program);
    assert!(text.contains("#label _start 00000000\n"));
    assert!(text.contains("#line main.c 7 00000000\n"));
    assert!(text.contains("#local count -8 4 00000004\n"));
}

#[test]
fn preprocessing_clean_text_is_idempotent() {
    let text = "add r1, r2, r3\nloop: br loop\n";
    let assembler =
        Configuration::new(vec![Source::new("test.s", text)], Mode::Kernel).assembler();

    assert_eq!(assembler.preprocess().unwrap(), vec![text.to_string()]);
}

#[test]
fn diagnostics_quote_the_offending_line() {
    let error = assemble_one("_start:\n  addx r1, r2, r3\n", Mode::Kernel).unwrap_err();

    assert_eq!(
        error.to_string(),
        "Error in test.s\nline 2: \"addx r1, r2, r3\"\nUnrecognized instruction",
    );
}

#[test]
fn bitwise_immediates_select_their_shift_class() {
    let program = assemble_one(
        "_start:\n\
         \x20 and r1, r2, 0x1000\n\
         \x20 and r1, r2, 0x100\n",
        Mode::Kernel,
    )
    .unwrap();

    let words = program.sections[0].words();
    assert_eq!(words[0] & 0xFFF, 0x110);
    assert_eq!(words[1] & 0xFFF, 0x101);

    let error = assemble_one("_start:\n and r1, r2, 0x101\n", Mode::Kernel).unwrap_err();
    assert!(error.to_string().contains("shifted by 0, 8, 16, or 24"));
}

#[test]
fn memory_operand_shapes() {
    let program = assemble_one(
        "_start:\n\
         \x20 swa r1, [r2]\n\
         \x20 swa r1, [r2, 8]\n\
         \x20 swa r1, [r2, 8]!\n\
         \x20 lwa r1, [r2], 8\n\
         \x20 sw r1, [r2, -2]\n\
         \x20 lw r1, [0x100]\n",
        Mode::Kernel,
    )
    .unwrap();

    let words = program.sections[0].words();
    // Offset, pre-increment, post-increment mode bits.
    assert_eq!((words[0] >> 14) & 3, 0);
    assert_eq!((words[1] >> 14) & 3, 0);
    assert_eq!((words[2] >> 14) & 3, 1);
    assert_eq!((words[3] >> 14) & 3, 2);
    assert_ne!(words[3] & (1 << 16), 0);
    // Register-relative and long-relative opcodes.
    assert_eq!(words[4] >> 27, 4);
    assert_eq!(words[4] & 0xFFFF, 0xFFFE);
    assert_eq!(words[5] >> 27, 5);
    assert_ne!(words[5] & (1 << 21), 0);
}

#[test]
fn pre_and_post_increment_require_the_absolute_form() {
    let error = assemble_one("_start:\n sw r1, [r2, 8]!\n", Mode::Kernel).unwrap_err();
    assert!(error.to_string().contains("Preincrement"));

    let error = assemble_one("_start:\n sw r1, [r2], 8\n", Mode::Kernel).unwrap_err();
    assert!(error.to_string().contains("Postincrement"));
}

#[test]
fn commas_and_semicolons_are_interchangeable_separators() {
    let program = assemble_one("_start:\n add r1; r2; r3\n", Mode::Kernel).unwrap();

    assert_eq!(program.sections[0].words()[0], 0x004401C3);
}
