//! 编译期生成 GIT_SHA、BUILD_TIMESTAMP 等元信息（供 version.rs 使用）

use vergen::EmitBuilder;

fn main() {
    // 非 git 工作区（如源码包）下 vergen 会输出占位值，不中断构建
    let _ = EmitBuilder::builder()
        .build_timestamp()
        .git_sha(true)
        .emit();
}
