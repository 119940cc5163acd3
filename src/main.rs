//! `vc` command-line interface: parses flags into a [`vc::CompilerConfig`]
//! and a small set of driver options, then delegates entirely to the
//! library crate. No pipeline logic lives here, mirroring the teacher's
//! `run_build`/`run_lint` delegation from its own thin `main.rs`.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use vc::config::{CompilerConfig, OptimizationLevel, Syntax, Target};
use vc::{compile_source, driver, ir_source, parse_source, preprocess_source, tokens_source, Session};

#[derive(Parser)]
#[command(name = "vc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ahead-of-time compiler for a pragmatic subset of C99 targeting x86 assembly")]
struct Cli {
    /// Input C source file.
    input: PathBuf,

    /// Output file (object, executable, or assembly depending on mode).
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Optimization level (0-3).
    #[arg(short = 'O', default_value_t = 0)]
    opt_level: u8,

    /// Additional include search directory.
    #[arg(short = 'I')]
    include_dirs: Vec<PathBuf>,

    /// Additional library search directory (passed through to the linker).
    #[arg(short = 'L')]
    library_dirs: Vec<PathBuf>,

    /// Link against a library (passed through to the linker).
    #[arg(short = 'l')]
    libraries: Vec<String>,

    /// Define a macro, optionally `name=value`.
    #[arg(short = 'D')]
    defines: Vec<String>,

    /// Undefine a macro.
    #[arg(short = 'U')]
    undefines: Vec<String>,

    /// Compile and assemble only, do not link.
    #[arg(short = 'c')]
    compile_only: bool,

    /// Stop after preprocessing; print the expanded source.
    #[arg(short = 'E')]
    preprocess_only: bool,

    /// Stop after code generation; emit assembly instead of an object file.
    #[arg(short = 'S')]
    assembly_only: bool,

    /// Print dependencies to stdout instead of compiling.
    #[arg(short = 'M')]
    print_deps: bool,

    /// Write a dependency file alongside the normal output.
    #[arg(long = "MD")]
    write_deps: bool,

    /// Force linking even with `-c`.
    #[arg(long)]
    link: bool,

    /// Language standard (accepted, not differentiated internally).
    #[arg(long, default_value = "c99")]
    std: String,

    /// Target x86-64 (the default).
    #[arg(long)]
    x86_64: bool,

    /// Target x86-32.
    #[arg(long)]
    x86_32: bool,

    /// Emit Intel/NASM syntax instead of AT&T/GAS.
    #[arg(long)]
    intel_syntax: bool,

    /// Keep frame pointers and emit richer diagnostics for a debugger.
    #[arg(long)]
    debug: bool,

    /// Emit DWARF line information (implies --debug).
    #[arg(long)]
    emit_dwarf: bool,

    /// Directory for intermediate files (assembly, objects).
    #[arg(long)]
    obj_dir: Option<PathBuf>,

    /// Override the system root used to resolve system includes.
    #[arg(long)]
    sysroot: Option<PathBuf>,

    /// Override the system include directory.
    #[arg(long)]
    vc_sysinclude: Option<PathBuf>,

    /// Link against the bundled libc instead of the host's.
    #[arg(long)]
    internal_libc: bool,

    /// Print each resolved include path as it is opened.
    #[arg(long)]
    verbose_includes: bool,

    /// Give every local variable a stable, named frame slot.
    #[arg(long)]
    named_locals: bool,

    #[arg(long)]
    no_fold: bool,
    #[arg(long)]
    no_dce: bool,
    #[arg(long)]
    no_cprop: bool,
    #[arg(long)]
    no_inline: bool,
    #[arg(long)]
    no_color: bool,
    #[arg(long)]
    no_warn_unreachable: bool,

    #[arg(long)]
    dump_asm: bool,
    #[arg(long)]
    dump_ast: bool,
    #[arg(long)]
    dump_ir: bool,
    #[arg(long)]
    dump_tokens: bool,

    /// Maximum `#include` nesting depth.
    #[arg(long = "fmax-include-depth", value_name = "N")]
    max_include_depth: Option<usize>,
}

/// `VCFLAGS` is prepended to argv per SPEC_FULL.md §6, the same way a shell
/// would splice in an environment-supplied flag string ahead of explicit
/// arguments.
fn full_args() -> Vec<String> {
    let mut args: Vec<String> = std::env::args().collect();
    if let Ok(extra) = std::env::var("VCFLAGS") {
        let mut prefixed: Vec<String> = vec![args.remove(0)];
        prefixed.extend(extra.split_whitespace().map(str::to_string));
        prefixed.extend(args);
        return prefixed;
    }
    args
}

fn build_config(cli: &Cli) -> CompilerConfig {
    let mut config = CompilerConfig::new();
    for dir in &cli.include_dirs {
        config = config.with_include_dir(dir.clone());
    }
    for define in &cli.defines {
        match define.split_once('=') {
            Some((name, value)) => config = config.with_define(name, Some(value.to_string())),
            None => config = config.with_define(define.clone(), None),
        }
    }
    for name in &cli.undefines {
        config = config.with_undefine(name.clone());
    }
    config = config.with_optimization(OptimizationLevel::from_flag(cli.opt_level));
    let target = if cli.x86_32 && !cli.x86_64 { Target::X86_32 } else { Target::X86_64 };
    config = config.with_target(target);
    config = config.with_syntax(if cli.intel_syntax { Syntax::Intel } else { Syntax::Att });
    if let Some(depth) = cli.max_include_depth {
        config = config.with_max_include_depth(depth);
    }
    config.sysroot = cli.sysroot.clone();
    config.vc_sysinclude = cli.vc_sysinclude.clone();
    config.verbose_includes = cli.verbose_includes;
    config.named_locals = cli.named_locals;
    config.track_dependencies = cli.print_deps || cli.write_deps;
    if cli.no_color {
        config.color = Some(false);
    }

    let mut toggles = config.optimizer_toggles;
    if cli.no_fold {
        toggles.fold = false;
    }
    if cli.no_dce {
        toggles.dce = false;
    }
    if cli.no_cprop {
        toggles.cprop = false;
    }
    if cli.no_inline {
        toggles.inlining = false;
    }
    if cli.no_warn_unreachable {
        toggles.unreachable = false;
    }
    config.optimizer_toggles = toggles;
    config
}

fn report(session: &Session, color: Option<bool>) {
    eprint!("{}", session.diagnostics.format_all(color));
}

fn main() -> ExitCode {
    let args = full_args();
    let cli = Cli::parse_from(args);
    let color = if cli.no_color { Some(false) } else { None };

    let source = match std::fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("vc: {}: {}", cli.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let config = build_config(&cli);
    let file_name = cli.input.clone();

    if cli.dump_tokens {
        return match tokens_source(config, &source, file_name) {
            Ok((tokens, _)) => {
                for t in &tokens {
                    println!("{t:?}");
                }
                ExitCode::SUCCESS
            }
            Err(session) => {
                report(&session, color);
                ExitCode::FAILURE
            }
        };
    }

    if cli.dump_ast {
        return match parse_source(config, &source, file_name) {
            Ok((ast, _)) => {
                println!("{ast:#?}");
                ExitCode::SUCCESS
            }
            Err(session) => {
                report(&session, color);
                ExitCode::FAILURE
            }
        };
    }

    if cli.dump_ir {
        return match ir_source(config, &source, file_name) {
            Ok((built, _)) => {
                print!("{}", built.dump());
                ExitCode::SUCCESS
            }
            Err(session) => {
                report(&session, color);
                ExitCode::FAILURE
            }
        };
    }

    if cli.preprocess_only {
        return match preprocess_source(config, &source, file_name) {
            Ok((text, _)) => {
                if let Some(out) = &cli.output {
                    if let Err(e) = std::fs::write(out, &text) {
                        eprintln!("vc: {}: {}", out.display(), e);
                        return ExitCode::FAILURE;
                    }
                } else {
                    print!("{text}");
                }
                ExitCode::SUCCESS
            }
            Err(session) => {
                report(&session, color);
                ExitCode::FAILURE
            }
        };
    }

    let output = match compile_source(config, &source, file_name.clone()) {
        Ok(output) => output,
        Err(session) => {
            report(&session, color);
            return ExitCode::FAILURE;
        }
    };

    if cli.print_deps {
        let target = cli.output.clone().unwrap_or_else(|| cli.input.with_extension("o"));
        print!("{}", driver::render_dependency_file(&target, &output.session.dependencies));
        return ExitCode::SUCCESS;
    }

    if cli.write_deps {
        let target = cli.output.clone().unwrap_or_else(|| cli.input.with_extension("o"));
        let dep_path = target.with_extension("d");
        if let Err(e) = driver::write_dependency_file(&dep_path, &target, &output.session.dependencies) {
            eprintln!("vc: {}: {}", dep_path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    if cli.dump_asm || cli.assembly_only {
        let out_path = cli.output.clone().unwrap_or_else(|| cli.input.with_extension("s"));
        if cli.dump_asm && !cli.assembly_only {
            print!("{}", output.assembly);
        } else if let Err(e) = std::fs::write(&out_path, &output.assembly) {
            eprintln!("vc: {}: {}", out_path.display(), e);
            return ExitCode::FAILURE;
        }
        if cli.assembly_only {
            return ExitCode::SUCCESS;
        }
        if !cli.dump_asm {
            return ExitCode::SUCCESS;
        }
    }

    let obj_path = cli.output.clone().unwrap_or_else(|| cli.input.with_extension("o"));
    let assembler = std::env::var("AS").unwrap_or_else(|_| "as".to_string());
    let (asm_path, mut temp) = match driver::create_temp_asm(cli.obj_dir.as_deref(), "vc") {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("vc: failed to create a temporary assembly file: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = driver::write_temp(&mut temp, &output.assembly) {
        eprintln!("vc: {}: {}", asm_path.display(), e);
        return ExitCode::FAILURE;
    }

    let extra_args: Vec<String> = if matches!(output.session.config.target, Target::X86_32) {
        vec!["--32".to_string()]
    } else {
        vec!["--64".to_string()]
    };
    match driver::run_assembler(&assembler, &asm_path, &obj_path, &extra_args) {
        Ok((outcome, _)) if outcome.success() => {
            // linking the final executable is out of scope for this driver;
            // `-c`/default and `--link` all stop at the assembled object file.
            ExitCode::SUCCESS
        }
        Ok((outcome, stderr)) => {
            eprintln!("vc: assembler failed ({outcome:?}):\n{stderr}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("vc: failed to run assembler '{assembler}': {e}");
            ExitCode::FAILURE
        }
    }
}
