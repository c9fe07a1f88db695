fn main() -> anyhow::Result<()> {
    ecoscenario_lib::run()
}
