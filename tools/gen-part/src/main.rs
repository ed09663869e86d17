use anyhow::Result;
use clap::Parser;
use gen_part::{
    PartBuilder, R_AMDGPU_ABS32_HI, R_AMDGPU_ABS32_LO, S_ENDPGM, S_NOP, SectionDesc, SymbolDesc,
    dwords,
};
use std::path::PathBuf;

/// Writes a sample AMDGPU shader part to disk.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Output path of the relocatable object.
    #[arg(short, long, default_value = "part.o")]
    out: PathBuf,

    /// Number of `s_nop` instructions before `s_endpgm`.
    #[arg(long, default_value_t = 3)]
    nops: usize,

    /// Private LDS symbols as `name:size:align`.
    #[arg(long = "lds")]
    lds: Vec<String>,

    /// Reference the external 64-bit symbol `scratch_va` from the code.
    #[arg(long)]
    scratch: bool,
}

fn parse_lds(spec: &str) -> Result<SymbolDesc> {
    let mut fields = spec.split(':');
    let (Some(name), Some(size), Some(align), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        anyhow::bail!("expected name:size:align, got `{spec}`");
    };
    Ok(SymbolDesc::lds(name, size.parse()?, align.parse()?))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut code = vec![S_NOP; args.nops];
    if args.scratch {
        // two literal slots patched with the low and high halves
        code.extend([0, 0]);
    }
    code.push(S_ENDPGM);

    let mut part = PartBuilder::new();
    let text = part.add_section(SectionDesc::text(dwords(&code)));
    if args.scratch {
        let sym = part.add_symbol(SymbolDesc::undefined("scratch_va"));
        let lo = (args.nops * 4) as u64;
        part.add_reloc(text, lo, sym, R_AMDGPU_ABS32_LO);
        part.add_reloc(text, lo + 4, sym, R_AMDGPU_ABS32_HI);
    }
    for spec in &args.lds {
        part.add_symbol(parse_lds(spec)?);
    }

    let bytes = part.build()?;
    std::fs::write(&args.out, &bytes)?;
    println!("Wrote {} ({} bytes)", args.out.display(), bytes.len());
    Ok(())
}
