use mimalloc::MiMalloc;
use sanpro_positioner::errors::AppError;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    sanpro_positioner::init_tracing();
    match sanpro_positioner::cli::parse_annotation_from_env()
        .and_then(sanpro_positioner::run_annotation_query)
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::HelpRequested { text }) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("get_annotations: {error}");
            ExitCode::from(1)
        }
    }
}
