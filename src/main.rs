fn main() -> anyhow::Result<()> {
    cogni_lib::run()
}
