use o2tuner::Registry;

fn main() {
    std::process::exit(o2tuner::cli::entrypoint(Registry::new()));
}
