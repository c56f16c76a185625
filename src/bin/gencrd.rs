use kube::CustomResourceExt;
use operator::crd::{PullSubscription, Scheduler, Topic};

use clap::Parser;
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    // Output directory
    #[arg(short, long, default_value = ".")]
    output: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    // Create directory if it does not exist
    std::fs::create_dir_all(&args.output)?;
    for (file, crd) in [
        ("scheduler.yaml", Scheduler::crd()),
        ("topic.yaml", Topic::crd()),
        ("pullsubscription.yaml", PullSubscription::crd()),
    ] {
        std::fs::write(
            format!("{}/{}", args.output, file),
            serde_yaml::to_string(&crd)?,
        )?;
    }
    Ok(())
}
