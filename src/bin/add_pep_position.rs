use mimalloc::MiMalloc;
use sanpro_positioner::errors::AppError;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    sanpro_positioner::init_tracing();
    match sanpro_positioner::cli::parse_position_from_env().and_then(sanpro_positioner::run_position) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::HelpRequested { text }) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("add_pep_position: {error}");
            ExitCode::from(1)
        }
    }
}
