use bbkt::ui::output;

fn main() {
    if let Err(err) = bbkt::cli::run() {
        output::error(format!("{:#}", err));
        std::process::exit(1);
    }
}
