//! Handlebars templates for the packaging scripts.

/// Zips the include paths into the project archive.
pub const PROJECT: &str = r#"set -e

mkdir -p {{output_dir}};

rm -f {{output_dir}}/{{archive}}

# Add directories and files to the zip
for path in {{include_paths}}; do
    if [ -e "$path" ]; then
        continue
    else
        echo "Path: '$path' does not exist. Please check the path and try again!"
        exit 1
    fi
done

zip -r {{output_dir}}/{{archive}} {{include_paths}} \
    -x "*.git/**" \
    -x "*.github/**" \
    -x "*.vscode/**" \
    -x "*__pycache__*"

echo "{{output_dir}}/{{archive}} created successfully!!"
"#;

/// Builds a conda environment locally and packs it.
pub const CONDA: &str = r#"set -e

export HTTP_PROXY={{proxy}}
export HTTPS_PROXY={{proxy}}
export PATH=/opt/conda/bin:/opt/conda/envs/runner-emr-env/bin:{{search_paths}}:$PATH

# Download and install Miniconda
if conda --version &> /dev/null; then
    echo "Conda is already installed"
else
    echo "Conda is not installed. Installing!!"
    wget -q https://repo.anaconda.com/miniconda/Miniconda3-latest-Linux-x86_64.sh -O ~/miniconda.sh
    /bin/bash ~/miniconda.sh -b -p /opt/conda
    rm -f ~/miniconda.sh
fi

mkdir -p {{output_dir}};

conda create -n emr_runner python={{python_version}} -y;
{{#each exec_commands}}
conda run -n emr_runner {{this}};
{{/each}}
pip install conda-pack;
conda pack -n emr_runner --ignore-missing-files -f -o {{output_dir}}/{{archive}};
"#;

/// Builds the environment on top of the EMR Serverless image and exports the
/// packed archive from a scratch stage.
pub const DOCKERFILE: &str = r#"FROM public.ecr.aws/emr-serverless/spark/emr-6.14.0:latest AS builder

ENV PATH="/opt/conda/bin:$PATH"
ENV PATH="/opt/conda/envs/runner-emr-env/bin:$PATH"

ENV HTTP_PROXY={{proxy}}
ENV HTTPS_PROXY={{proxy}}

USER root

WORKDIR /build

COPY {{include_paths}} .

RUN yum install -y gcc openssl-devel bzip2-devel libffi-devel tar gzip wget make

# Download and install Miniconda
RUN wget -q https://repo.anaconda.com/miniconda/Miniconda3-latest-Linux-x86_64.sh -O ~/miniconda.sh --no-check-certificate && \
    /bin/bash ~/miniconda.sh -b -p /opt/conda

RUN conda create -n runner-emr-env python={{python_version}} -y --force
RUN echo "conda activate runner-emr-env" > ~/.bashrc
{{#each exec_commands}}
RUN conda run -n runner-emr-env {{this}};
{{/each}}

# Export the conda environment as an archive
RUN mkdir -p dist && pip install conda-pack && conda pack -n runner-emr-env --ignore-missing-files -f -o /build/dist/{{archive}};

# Copy the archive into an empty image so it can be exported
FROM scratch AS export
COPY --from=builder /build/dist/{{archive}} .
"#;

/// Builds the Dockerfile and exports the final stage to the output directory.
pub const DOCKER_BUILD: &str =
    "docker buildx build -f {{dockerfile}} --output type=local,dest={{output_dir}} .";
