// 该文件是 Kantu （看图识物） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 分类推理基准测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use anyhow::Result;
use clap::Parser;
use url::Url;

use kantu::{
  FromUrl,
  model::{ClassifierBuilder, ClassifierNhwc},
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// Kantu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类模型，如 classify:/path/to/model.onnx?labels=/path/to/labels.txt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，如 image:/path/to/picture.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，如 image:/path/to/result.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 重复推理次数
  #[arg(long, value_name = "TIMES", default_value = "1000")]
  pub times: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("重复次数: {}", args.times);

  let input = kantu::input::ImageFileInput::<224, 224>::from_url(&args.input)?;
  let model: ClassifierNhwc<224, 224> = ClassifierBuilder::from_url(&args.model)?.build()?;
  let output = kantu::output::SaveImageFileOutput::from_url(&args.output)?;

  RepeatShotTask::default()
    .with_times(args.times)
    .run_task(input.into_nhwc(), model, output)?;

  Ok(())
}
