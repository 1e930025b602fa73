//! lightsvm Command Line Interface
//!
//! Train linear and kernel classifiers with coordinate descent, SGD or the
//! primal Newton solver, and use the saved models on LibSVM or CSV data.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info, warn};
use lightsvm::core::{
    CoordinateDescentConfig, Dataset, Eta0, LearningRate, Multiclass, NewtonConfig, Penalty,
    Result, Selection, SgdConfig, SolverError, Termination,
};
use lightsvm::data::{load_csv, load_libsvm};
use lightsvm::kernel::KernelSpec;
use lightsvm::loss::Loss;
use lightsvm::persistence::SerializableModel;
use lightsvm::solver::{CoordinateDescent, PrimalNewton, StochasticGradient};
use lightsvm::utils::{accuracy, binary_labels, encode_classes, predict_classes};
use lightsvm::Solution;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "lightsvm")]
#[command(about = "Coordinate descent and SGD solvers for linear and kernel classifiers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a new model
    Train(TrainArgs),
    /// Make predictions using a trained model
    Predict(PredictArgs),
    /// Display model information
    Info(InfoArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum CliSolver {
    /// Primal coordinate descent
    #[value(name = "cd")]
    CoordinateDescent,
    /// Stochastic gradient descent
    #[value(name = "sgd")]
    Sgd,
    /// Primal Newton (kernel squared hinge)
    #[value(name = "newton")]
    Newton,
}

impl CliSolver {
    fn name(self) -> &'static str {
        match self {
            CliSolver::CoordinateDescent => "cd",
            CliSolver::Sgd => "sgd",
            CliSolver::Newton => "newton",
        }
    }
}

#[derive(Args)]
struct TrainArgs {
    /// Training data file (LibSVM or CSV format)
    #[arg(long)]
    data: PathBuf,

    /// Output model file
    #[arg(short, long)]
    output: PathBuf,

    /// Data format: auto, libsvm, or csv
    #[arg(short, long, default_value = "auto")]
    format: String,

    #[arg(long, value_enum, default_value = "cd")]
    solver: CliSolver,

    /// Loss function, e.g. hinge, perceptron, squared_hinge, log
    /// (default: squared_hinge for cd, hinge for sgd)
    #[arg(long)]
    loss: Option<String>,

    /// Epsilon of the huber and epsilon-insensitive losses
    #[arg(long, default_value = "0.1")]
    loss_epsilon: f64,

    /// Penalty: l1, l2 or l1/l2
    #[arg(long, default_value = "l2")]
    penalty: String,

    /// Data term weight for coordinate descent
    #[arg(short = 'C', long, default_value = "1.0")]
    c: f64,

    /// Regularization strength for sgd and newton
    #[arg(long)]
    lambda: Option<f64>,

    /// Kernel: linear, poly, rbf, sigmoid or precomputed (omit for a linear model)
    #[arg(long)]
    kernel: Option<String>,

    #[arg(long, default_value = "1.0")]
    gamma: f64,

    #[arg(long, default_value = "0.0")]
    coef0: f64,

    #[arg(long, default_value = "3")]
    degree: u32,

    /// Maximum passes (cd), epochs (sgd) or Newton iterations
    #[arg(long)]
    max_iter: Option<usize>,

    /// Convergence tolerance
    #[arg(long, default_value = "0.001")]
    tol: f64,

    /// Seed of the random sequence
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Kernel cache size in MB
    #[arg(long, default_value = "500")]
    cache_mb: usize,

    /// Coordinate selection for cd: cyclic, permute, loss or active
    #[arg(long, default_value = "cyclic")]
    selection: String,

    /// Termination for cd: convergence, max_iter or n_components
    #[arg(long, default_value = "convergence")]
    termination: String,

    /// Disable shrinking in cd
    #[arg(long)]
    no_shrinking: bool,

    /// Multiclass strategy for sgd: ovr or natural
    #[arg(long, default_value = "ovr")]
    multiclass: String,

    /// Learning rate for sgd: constant, pegasos or invscaling
    #[arg(long, default_value = "pegasos")]
    learning_rate: String,

    /// Initial step size for sgd, a number or "auto"
    #[arg(long, default_value = "0.03")]
    eta0: String,

    /// Random kernel components (sgd) or target nonzero count (cd)
    #[arg(long, default_value = "0")]
    n_components: usize,
}

#[derive(Args)]
struct PredictArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Input data file
    #[arg(long)]
    data: PathBuf,

    /// Output predictions file (prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Data format: auto, libsvm, or csv
    #[arg(short, long, default_value = "auto")]
    format: String,

    /// Write decision values next to the labels
    #[arg(long)]
    scores: bool,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Train(args) => train_command(args),
        Commands::Predict(args) => predict_command(args),
        Commands::Info(args) => info_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn train_command(args: TrainArgs) -> Result<()> {
    info!("Training {} model from {:?}", args.solver.name(), args.data);

    match resolve_format(&args.format, &args.data)?.as_str() {
        "csv" => {
            let loaded = load_csv(&args.data)?;
            train_with_dataset(&args, &loaded.data, &loaded.labels)
        }
        _ => {
            let loaded = load_libsvm(&args.data)?;
            train_with_dataset(&args, &loaded.data, &loaded.labels)
        }
    }
}

fn train_with_dataset<D: Dataset>(args: &TrainArgs, ds: &D, labels: &[f64]) -> Result<()> {
    info!(
        "Loaded {} samples with {} features",
        ds.n_samples(),
        ds.n_features()
    );

    let (classes, y) = encode_classes(labels)?;
    if classes.len() < 2 {
        return Err(SolverError::InvalidDataset(
            "training data must contain at least two classes".to_string(),
        ));
    }
    info!("Classes: {:?}", classes);

    let kernel = match &args.kernel {
        Some(name) => Some(KernelSpec::from_name(name, args.gamma, args.coef0, args.degree)?),
        None => None,
    };
    let cache_bytes = args.cache_mb * 1024 * 1024;
    let binary = classes.len() == 2;

    let (solution, loss) = match args.solver {
        CliSolver::CoordinateDescent => {
            let loss = Loss::from_name(
                args.loss.as_deref().unwrap_or("squared_hinge"),
                args.loss_epsilon,
            )?;
            let mut config = CoordinateDescentConfig::default()
                .with_c(args.c)
                .with_loss(loss)
                .with_penalty(Penalty::from_name(&args.penalty)?)
                .with_selection(Selection::from_name(&args.selection)?)
                .with_termination(Termination::from_name(&args.termination, args.n_components)?)
                .with_tol(args.tol)
                .with_shrinking(!args.no_shrinking)
                .with_cache_bytes(cache_bytes)
                .with_seed(args.seed);
            if let Some(kernel) = kernel {
                config = config.with_kernel(kernel);
            }
            if let Some(max_iter) = args.max_iter {
                config = config.with_max_iter(max_iter);
            }

            let mut solver = CoordinateDescent::new(config)?;
            let solution = if binary {
                solver.fit(ds, &binary_labels(&y))?
            } else {
                solver.fit_multiclass(ds, &y, classes.len())?
            };
            (solution, loss)
        }
        CliSolver::Sgd => {
            let loss = Loss::from_name(args.loss.as_deref().unwrap_or("hinge"), args.loss_epsilon)?;
            let mut config = SgdConfig::default()
                .with_loss(loss)
                .with_penalty(Penalty::from_name(&args.penalty)?)
                .with_multiclass(Multiclass::from_name(&args.multiclass)?)
                .with_learning_rate(LearningRate::from_name(&args.learning_rate)?)
                .with_eta0(Eta0::from_name(&args.eta0)?)
                .with_n_components(args.n_components)
                .with_cache_bytes(cache_bytes)
                .with_seed(args.seed);
            if let Some(lambda) = args.lambda {
                config = config.with_lambda(lambda);
            }
            if let Some(kernel) = kernel {
                config = config.with_kernel(kernel);
            }
            if let Some(max_iter) = args.max_iter {
                config = config.with_max_iter(max_iter);
            }

            let solver = StochasticGradient::new(config)?;
            let solution = if binary {
                solver.fit(ds, &binary_labels(&y))?
            } else {
                solver.fit_multiclass(ds, &y, classes.len())?
            };
            (solution, loss)
        }
        CliSolver::Newton => {
            if args.loss.as_deref().is_some_and(|l| l != "squared_hinge") {
                warn!("The newton solver always uses the squared hinge loss");
            }
            let mut config = NewtonConfig::default()
                .with_kernel(kernel.unwrap_or_default());
            if let Some(lambda) = args.lambda {
                config = config.with_lambda(lambda);
            }
            if let Some(max_iter) = args.max_iter {
                config = config.with_max_iter(max_iter);
            }
            config.tol = args.tol;
            config.cache_bytes = cache_bytes;

            let solver = PrimalNewton::new(config)?;
            let solution = if binary {
                solver.fit(ds, &binary_labels(&y))?
            } else {
                solver.fit_multiclass(ds, &y, classes.len())?
            };
            (solution, Loss::SquaredHinge { threshold: 1.0 })
        }
    };

    report_solution(&solution);

    // Newton models are kernel expansions even with the linear kernel
    let model_kernel = match args.solver {
        CliSolver::Newton => Some(kernel.unwrap_or_default()),
        _ => kernel,
    };
    let model = SerializableModel::from_solution(
        args.solver.name(),
        &solution,
        model_kernel,
        loss,
        classes,
        ds,
    )?;
    model.save_to_file(&args.output)?;
    info!("Model saved to: {:?}", args.output);

    let predicted = predict_classes(&model.decision_function(ds)?);
    info!("Training accuracy: {:.2}%", accuracy(&predicted, &y) * 100.0);

    Ok(())
}

fn report_solution(solution: &Solution) {
    info!("Iterations: {}", solution.n_iter);
    info!("Converged: {}", solution.converged);
    info!("Nonzero coefficients: {}", solution.n_nonzero());
    info!("Objective: {:.6}", solution.objective);
    if solution.stalls > 0 {
        info!("Stalled steps: {}", solution.stalls);
    }
}

fn predict_command(args: PredictArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model = SerializableModel::load_from_file(&args.model)?;

    info!("Loading prediction data from: {:?}", args.data);
    match resolve_format(&args.format, &args.data)?.as_str() {
        "csv" => {
            let loaded = load_csv(&args.data)?;
            predict_with_dataset(&args, &model, &loaded.data, &loaded.labels)
        }
        _ => {
            let loaded = load_libsvm(&args.data)?;
            predict_with_dataset(&args, &model, &loaded.data, &loaded.labels)
        }
    }
}

fn predict_with_dataset<D: Dataset>(
    args: &PredictArgs,
    model: &SerializableModel,
    ds: &D,
    labels: &[f64],
) -> Result<()> {
    let scores = model.decision_function(ds)?;
    let predictions = model.predict(ds)?;

    let correct = predictions.iter().zip(labels).filter(|(p, l)| p == l).count();
    info!(
        "Accuracy against file labels: {:.2}%",
        100.0 * correct as f64 / predictions.len().max(1) as f64
    );

    let mut lines = Vec::with_capacity(predictions.len());
    for (i, label) in predictions.iter().enumerate() {
        if args.scores {
            let values: Vec<String> = scores.row(i).iter().map(|s| format!("{:.6}", s)).collect();
            lines.push(format!("{} {}", label, values.join(" ")));
        } else {
            lines.push(format!("{}", label));
        }
    }

    match &args.output {
        Some(path) => {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            for line in &lines {
                writeln!(writer, "{}", line)?;
            }
            writer.flush()?;
            info!("Predictions saved to: {path:?}");
        }
        None => {
            for line in &lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model = SerializableModel::load_from_file(&args.model)?;

    println!("=== Model Summary ===");
    println!("Solver: {}", model.solver);
    match &model.kernel {
        Some(kernel) => println!("Kernel: {}", kernel.name()),
        None => println!("Kernel: none (linear model)"),
    }
    println!("Loss: {}", model.loss.name());
    println!("Classes: {:?}", model.classes);
    println!("Features: {}", model.n_features);
    println!("Coefficient rows: {}", model.coef.len());
    if model.kernel.is_some() {
        println!("Support vectors: {}", model.n_support_vectors());
    }
    println!("Nonzero coefficients: {}", model.metadata.n_nonzero);
    println!("Iterations: {}", model.metadata.n_iter);
    println!("Converged: {}", model.metadata.converged);
    println!("Objective: {:.6}", model.metadata.objective);
    println!("Library version: {}", model.metadata.library_version);
    println!("Created: {}", model.metadata.created_at);

    Ok(())
}

fn resolve_format(format: &str, path: &Path) -> Result<String> {
    match format {
        "auto" => Ok(detect_format(path)),
        "libsvm" | "csv" => Ok(format.to_string()),
        other => Err(SolverError::config(format!(
            "Unsupported format: {other}. Use 'libsvm' or 'csv'"
        ))),
    }
}

fn detect_format(path: &Path) -> String {
    if let Some(ext) = path.extension() {
        match ext.to_str() {
            Some("csv") => "csv".to_string(),
            Some("libsvm") | Some("svm") => "libsvm".to_string(),
            _ => {
                warn!("Unknown file extension, assuming LibSVM format");
                "libsvm".to_string()
            }
        }
    } else {
        warn!("No file extension, assuming LibSVM format");
        "libsvm".to_string()
    }
}
